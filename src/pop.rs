//! POP3 client (RFC 1939)
//!
//! Linear states: Authorization (USER/PASS or APOP) → Transaction
//! (STAT, LIST, UIDL, RETR, TOP, DELE, NOOP, RSET) → Update (QUIT).
//! Multi-line bodies are collected and de-stuffed by the framer.

use crate::config::{MailConfig, Security};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::framer::{FramerMode, PopReply};
use crate::mime::{self, MimeMessage};
use tracing::{debug, info};

/// Async POP3 client.
pub struct Pop3Client {
    conn: Connection,
    config: MailConfig,
    /// The `<...>` timestamp from the greeting, when the server
    /// offers APOP.
    timestamp: Option<String>,
}

impl Pop3Client {
    /// Connect and consume the `+OK` greeting, capturing the APOP
    /// timestamp when present.
    pub async fn connect(config: MailConfig) -> Result<Self> {
        let conn = Connection::open(&config, FramerMode::Pop3).await?;
        let mut client = Self {
            conn,
            config,
            timestamp: None,
        };
        let greeting = client.conn.read_pop_reply().await?;
        let greeting = expect_ok(greeting)?;
        client.timestamp = extract_timestamp(&greeting.message);
        if client.config.security == Security::StartTls {
            client.stls().await?;
        }
        info!(
            "Connected to POP3 server {}:{}",
            client.config.host, client.config.port
        );
        Ok(client)
    }

    /// Whether the greeting carried an APOP timestamp.
    #[must_use]
    pub fn supports_apop(&self) -> bool {
        self.timestamp.is_some()
    }

    /// STLS upgrade (RFC 2595). The pre-upgrade timestamp is
    /// discarded since APOP over the old greeting is no longer valid.
    pub async fn stls(&mut self) -> Result<()> {
        let reply = self.command("STLS").await?;
        expect_ok(reply)?;
        let host = self.config.host.clone();
        self.conn
            .upgrade_tls(&host, self.config.accept_invalid_certs)
            .await?;
        self.timestamp = None;
        Ok(())
    }

    /// USER/PASS authentication.
    pub async fn login(&mut self) -> Result<()> {
        let username = self.config.username.clone();
        let reply = self.command(&format!("USER {username}")).await?;
        expect_ok(reply)?;
        debug!("C: PASS <redacted>");
        self.conn
            .write_line(&format!("PASS {}", self.config.password))
            .await?;
        let reply = self.conn.read_pop_reply().await?;
        expect_ok(reply)?;
        info!("Logged in as {}", self.config.username);
        Ok(())
    }

    /// APOP digest authentication: MD5 over the greeting timestamp
    /// concatenated with the shared secret.
    pub async fn apop(&mut self) -> Result<()> {
        let timestamp = self.timestamp.clone().ok_or_else(|| {
            Error::PreconditionFailed("server greeting carried no APOP timestamp".into())
        })?;
        let digest = apop_digest(&timestamp, &self.config.password);
        let username = self.config.username.clone();
        debug!("C: APOP {} <digest>", username);
        self.conn
            .write_line(&format!("APOP {username} {digest}"))
            .await?;
        let reply = self.conn.read_pop_reply().await?;
        expect_ok(reply)?;
        info!("Logged in as {} via APOP", self.config.username);
        Ok(())
    }

    /// STAT: message count and total maildrop size in octets.
    pub async fn stat(&mut self) -> Result<(u32, u64)> {
        let reply = self.command("STAT").await?;
        let reply = expect_ok(reply)?;
        let mut words = reply.message.split_whitespace();
        let count = parse_number(words.next())?;
        let size = parse_number(words.next())?;
        Ok((count, size))
    }

    /// LIST: per-message sizes, either for one message or the whole
    /// maildrop.
    pub async fn list(&mut self, message: Option<u32>) -> Result<Vec<(u32, u64)>> {
        if let Some(id) = message {
            let reply = self.command(&format!("LIST {id}")).await?;
            let reply = expect_ok(reply)?;
            let mut words = reply.message.split_whitespace();
            let id = parse_number(words.next())?;
            let size = parse_number(words.next())?;
            return Ok(vec![(id, size)]);
        }
        self.conn.expect_multiline();
        let reply = self.command("LIST").await?;
        let reply = expect_ok(reply)?;
        scan_listing(reply.body.as_deref().unwrap_or_default())
    }

    /// UIDL: stable unique ids, one message or all.
    pub async fn uidl(&mut self, message: Option<u32>) -> Result<Vec<(u32, String)>> {
        if let Some(id) = message {
            let reply = self.command(&format!("UIDL {id}")).await?;
            let reply = expect_ok(reply)?;
            let mut words = reply.message.split_whitespace();
            let id = parse_number(words.next())?;
            let uid = words.next().unwrap_or_default().to_string();
            return Ok(vec![(id, uid)]);
        }
        self.conn.expect_multiline();
        let reply = self.command("UIDL").await?;
        let reply = expect_ok(reply)?;
        let mut out = Vec::new();
        for line in lines_of(reply.body.as_deref().unwrap_or_default()) {
            let mut words = line.split_whitespace();
            let id = parse_number(words.next())?;
            out.push((id, words.next().unwrap_or_default().to_string()));
        }
        Ok(out)
    }

    /// RETR: the full raw message.
    pub async fn retr(&mut self, message: u32) -> Result<Vec<u8>> {
        self.conn.expect_multiline();
        let reply = self.command(&format!("RETR {message}")).await?;
        let reply = expect_ok(reply)?;
        reply
            .body
            .ok_or_else(|| Error::Protocol("RETR reply carried no body".into()))
    }

    /// RETR parsed into a [`MimeMessage`].
    pub async fn retr_message(&mut self, message: u32) -> Result<MimeMessage> {
        let raw = self.retr(message).await?;
        mime::parse(&raw)
    }

    /// TOP: headers plus the first `lines` body lines.
    pub async fn top(&mut self, message: u32, lines: u32) -> Result<Vec<u8>> {
        self.conn.expect_multiline();
        let reply = self.command(&format!("TOP {message} {lines}")).await?;
        let reply = expect_ok(reply)?;
        reply
            .body
            .ok_or_else(|| Error::Protocol("TOP reply carried no body".into()))
    }

    /// DELE: mark a message for deletion at QUIT.
    pub async fn dele(&mut self, message: u32) -> Result<()> {
        let reply = self.command(&format!("DELE {message}")).await?;
        expect_ok(reply)?;
        Ok(())
    }

    pub async fn noop(&mut self) -> Result<()> {
        let reply = self.command("NOOP").await?;
        expect_ok(reply)?;
        Ok(())
    }

    /// RSET: unmark messages marked for deletion.
    pub async fn rset(&mut self) -> Result<()> {
        let reply = self.command("RSET").await?;
        expect_ok(reply)?;
        Ok(())
    }

    /// QUIT: enter the Update state and close the connection.
    pub async fn quit(&mut self) -> Result<()> {
        let reply = self.command("QUIT").await?;
        expect_ok(reply)?;
        self.conn.close().await.ok();
        Ok(())
    }

    async fn command(&mut self, line: &str) -> Result<PopReply> {
        debug!("C: {}", line);
        self.conn.write_line(line).await?;
        self.conn.read_pop_reply().await
    }
}

fn expect_ok(reply: PopReply) -> Result<PopReply> {
    if reply.ok {
        Ok(reply)
    } else {
        Err(Error::ServerStatus {
            code: "-ERR".to_string(),
            message: reply.message,
        })
    }
}

/// The APOP digest: lowercase hex MD5 of `<timestamp><secret>`.
fn apop_digest(timestamp: &str, secret: &str) -> String {
    format!("{:x}", md5::compute(format!("{timestamp}{secret}")))
}

/// The `<process-id.clock@host>` token of the greeting, if any.
fn extract_timestamp(greeting: &str) -> Option<String> {
    let start = greeting.find('<')?;
    let end = greeting[start..].find('>')? + start;
    Some(greeting[start..=end].to_string())
}

fn parse_number<T: std::str::FromStr>(word: Option<&str>) -> Result<T> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed POP3 listing: {word:?}")))
}

fn lines_of(body: &[u8]) -> impl Iterator<Item = String> + '_ {
    body.split(|&b| b == b'\n').filter_map(|line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(line).into_owned())
        }
    })
}

fn scan_listing(body: &[u8]) -> Result<Vec<(u32, u64)>> {
    let mut out = Vec::new();
    for line in lines_of(body) {
        let mut words = line.split_whitespace();
        let id = parse_number(words.next())?;
        let size = parse_number(words.next())?;
        out.push((id, size));
    }
    Ok(out)
}
