//! SMTP client (RFC 5321)
//!
//! A linear state machine driven by reply codes: greeting → EHLO →
//! optional STARTTLS (with a second EHLO) → AUTH → any number of
//! MAIL/RCPT/DATA transactions → QUIT. 2yz/3yz replies gate each
//! transition; 4yz and 5yz refusals surface as
//! [`Error::ServerStatus`] with the reply text.

use crate::config::{MailConfig, Security};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::framer::{FramerMode, SmtpReply};
use crate::mime::MimeMessage;
use crate::mime::encodings::base64_encode;
use tracing::{debug, info};

/// Async SMTP client.
pub struct SmtpClient {
    conn: Connection,
    config: MailConfig,
    /// Extension keywords from the last EHLO reply.
    extensions: Vec<String>,
}

impl SmtpClient {
    /// Connect and consume the `220` greeting. With
    /// [`Security::StartTls`] the connection is upgraded (including
    /// the extra EHLO round-trips) before this returns.
    pub async fn connect(config: MailConfig) -> Result<Self> {
        let conn = Connection::open(&config, FramerMode::Smtp).await?;
        let mut client = Self {
            conn,
            config,
            extensions: Vec::new(),
        };
        let greeting = client.conn.read_smtp_reply().await?;
        expect_positive(greeting)?;
        if client.config.security == Security::StartTls {
            client.ehlo("localhost").await?;
            client.start_tls().await?;
        }
        info!(
            "Connected to SMTP server {}:{}",
            client.config.host, client.config.port
        );
        Ok(client)
    }

    /// Extension keywords the server advertised in EHLO.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// EHLO; records the advertised extensions.
    pub async fn ehlo(&mut self, client_domain: &str) -> Result<SmtpReply> {
        let reply = self.command(&format!("EHLO {client_domain}")).await?;
        let reply = expect_positive(reply)?;
        self.extensions = reply
            .lines
            .iter()
            .skip(1)
            .map(|line| line.trim().to_string())
            .collect();
        Ok(reply)
    }

    /// HELO fallback for servers without EHLO.
    pub async fn helo(&mut self, client_domain: &str) -> Result<SmtpReply> {
        let reply = self.command(&format!("HELO {client_domain}")).await?;
        expect_positive(reply)
    }

    /// STARTTLS upgrade; capability state is invalidated, so callers
    /// (other than [`Self::connect`]) must EHLO again afterwards.
    pub async fn start_tls(&mut self) -> Result<()> {
        let reply = self.command("STARTTLS").await?;
        expect_positive(reply)?;
        let host = self.config.host.clone();
        self.conn
            .upgrade_tls(&host, self.config.accept_invalid_certs)
            .await?;
        self.extensions.clear();
        self.ehlo("localhost").await?;
        Ok(())
    }

    /// AUTH PLAIN (RFC 4616): a single base64 blob of
    /// `\0user\0password`.
    pub async fn auth_plain(&mut self) -> Result<SmtpReply> {
        let blob = format!("\0{}\0{}", self.config.username, self.config.password);
        let encoded = base64_encode(blob.as_bytes());
        debug!("C: AUTH PLAIN <redacted>");
        self.conn
            .write_line(&format!("AUTH PLAIN {encoded}"))
            .await?;
        let reply = self.conn.read_smtp_reply().await?;
        expect_positive(reply)
    }

    /// AUTH LOGIN: username and password in separate base64
    /// exchanges.
    pub async fn auth_login(&mut self) -> Result<SmtpReply> {
        let reply = self.command("AUTH LOGIN").await?;
        expect_intermediate(&reply)?;
        debug!("C: <redacted username>");
        self.conn
            .write_line(&base64_encode(self.config.username.as_bytes()))
            .await?;
        let reply = self.conn.read_smtp_reply().await?;
        expect_intermediate(&reply)?;
        debug!("C: <redacted password>");
        self.conn
            .write_line(&base64_encode(self.config.password.as_bytes()))
            .await?;
        let reply = self.conn.read_smtp_reply().await?;
        expect_positive(reply)
    }

    /// MAIL FROM — begins a transaction.
    pub async fn mail_from(&mut self, sender: &str) -> Result<SmtpReply> {
        let reply = self.command(&format!("MAIL FROM:<{sender}>")).await?;
        expect_positive(reply)
    }

    /// RCPT TO — may be repeated per recipient.
    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<SmtpReply> {
        let reply = self.command(&format!("RCPT TO:<{recipient}>")).await?;
        expect_positive(reply)
    }

    /// DATA: sends the message bytes dot-stuffed, terminated by
    /// `CRLF.CRLF`.
    pub async fn data(&mut self, message: &[u8]) -> Result<SmtpReply> {
        let reply = self.command("DATA").await?;
        expect_intermediate(&reply)?;
        debug!("C: <{} message bytes>", message.len());
        self.conn.write_raw(&dot_stuff(message)).await?;
        let reply = self.conn.read_smtp_reply().await?;
        expect_positive(reply)
    }

    /// Send a built [`MimeMessage`]: MAIL FROM the `From` header,
    /// RCPT TO every To/Cc/Bcc address, then DATA.
    pub async fn send_message(&mut self, message: &MimeMessage) -> Result<SmtpReply> {
        let sender = message
            .header("From")
            .map(extract_address)
            .ok_or_else(|| Error::PreconditionFailed("message has no From header".into()))?;
        let mut recipients = Vec::new();
        for header in ["To", "Cc", "Bcc"] {
            if let Some(value) = message.header(header) {
                recipients.extend(value.split(',').map(extract_address));
            }
        }
        if recipients.is_empty() {
            return Err(Error::PreconditionFailed("message has no recipients".into()));
        }

        self.mail_from(&sender).await?;
        for recipient in recipients {
            self.rcpt_to(&recipient).await?;
        }
        self.data(&message.to_bytes()?).await
    }

    /// RSET — abort the current transaction.
    pub async fn rset(&mut self) -> Result<SmtpReply> {
        let reply = self.command("RSET").await?;
        expect_positive(reply)
    }

    pub async fn noop(&mut self) -> Result<SmtpReply> {
        let reply = self.command("NOOP").await?;
        expect_positive(reply)
    }

    /// QUIT and close the connection.
    pub async fn quit(&mut self) -> Result<SmtpReply> {
        let reply = self.command("QUIT").await?;
        self.conn.close().await.ok();
        Ok(reply)
    }

    async fn command(&mut self, line: &str) -> Result<SmtpReply> {
        debug!("C: {}", line);
        self.conn.write_line(line).await?;
        self.conn.read_smtp_reply().await
    }
}

fn expect_positive(reply: SmtpReply) -> Result<SmtpReply> {
    if reply.is_positive() {
        Ok(reply)
    } else {
        Err(refusal(&reply))
    }
}

fn expect_intermediate(reply: &SmtpReply) -> Result<()> {
    if reply.is_intermediate() {
        Ok(())
    } else {
        Err(refusal(reply))
    }
}

fn refusal(reply: &SmtpReply) -> Error {
    Error::ServerStatus {
        code: reply.code.to_string(),
        message: reply.message(),
    }
}

/// Pull the bare address out of `Name <addr>` or a plain address.
fn extract_address(value: &str) -> String {
    let value = value.trim();
    value
        .rfind('<')
        .and_then(|start| {
            value[start + 1..]
                .split('>')
                .next()
                .map(str::to_string)
        })
        .unwrap_or_else(|| value.to_string())
}

/// Dot-stuff a message body and append the end-of-data sequence,
/// without doubling a CRLF the body already ends with.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 8);
    let mut at_line_start = true;
    let mut i = 0;
    while i < message.len() {
        let b = message[i];
        if at_line_start && b == b'.' {
            out.push(b'.');
        }
        out.push(b);
        at_line_start = b == b'\n';
        i += 1;
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
