//! Shared connection plumbing
//!
//! Owns the transport, the framer and the read buffer for one client
//! session, whichever protocol it speaks. The IMAP, SMTP and POP3
//! clients all drive their sockets through [`Connection`].

use crate::config::{MailConfig, Security};
use crate::error::{Error, Result};
use crate::framer::{Frame, Framer, FramerMode, PopReply, ResponseUnit, SmtpReply};
use crate::transport::Transport;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::trace;

pub(crate) struct Connection {
    transport: Option<Transport>,
    framer: Framer,
    buf: BytesMut,
}

impl Connection {
    /// Dial the configured server. With [`Security::Tls`] the TLS
    /// handshake happens before any protocol byte; with
    /// [`Security::StartTls`] the caller upgrades later via
    /// [`Connection::upgrade_tls`].
    pub async fn open(config: &MailConfig, mode: FramerMode) -> Result<Self> {
        let transport = match config.security {
            Security::Tls => {
                Transport::connect_tls(&config.host, config.port, config.accept_invalid_certs)
                    .await?
            }
            Security::None | Security::StartTls => {
                Transport::connect(&config.host, config.port).await?
            }
        };
        Ok(Self {
            transport: Some(transport),
            framer: Framer::new(mode),
            buf: BytesMut::with_capacity(8 * 1024),
        })
    }

    fn transport_mut(&mut self) -> Result<&mut Transport> {
        self.transport.as_mut().ok_or(Error::ConnectionLost)
    }

    pub fn is_secure(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_secure)
    }

    /// Re-bind the framer to a TLS-wrapped stream. Bytes buffered from
    /// the plaintext layer are discarded.
    pub async fn upgrade_tls(&mut self, host: &str, accept_invalid_certs: bool) -> Result<()> {
        let transport = self.transport.take().ok_or(Error::ConnectionLost)?;
        let upgraded = transport.upgrade_tls(host, accept_invalid_certs).await?;
        self.transport = Some(upgraded);
        self.buf.clear();
        Ok(())
    }

    /// Mark the next POP3 reply as multi-line.
    pub fn expect_multiline(&mut self) {
        self.framer.expect_multiline();
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.framer.decode(&mut self.buf)? {
                return Ok(frame);
            }
            let transport = self.transport.as_mut().ok_or(Error::ConnectionLost)?;
            let n = transport.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::ConnectionLost);
            }
        }
    }

    /// Read one IMAP response unit.
    pub async fn read_unit(&mut self) -> Result<ResponseUnit> {
        match self.read_frame().await? {
            Frame::Imap(unit) => {
                trace!("S: {}", unit.head);
                Ok(unit)
            }
            _ => Err(Error::Protocol("connection is not in IMAP mode".into())),
        }
    }

    /// Read one SMTP reply.
    pub async fn read_smtp_reply(&mut self) -> Result<SmtpReply> {
        match self.read_frame().await? {
            Frame::Smtp(reply) => {
                trace!("S: {} {}", reply.code, reply.message());
                Ok(reply)
            }
            _ => Err(Error::Protocol("connection is not in SMTP mode".into())),
        }
    }

    /// Read one POP3 reply.
    pub async fn read_pop_reply(&mut self) -> Result<PopReply> {
        match self.read_frame().await? {
            Frame::Pop(reply) => {
                trace!(
                    "S: {} {}",
                    if reply.ok { "+OK" } else { "-ERR" },
                    reply.message
                );
                Ok(reply)
            }
            _ => Err(Error::Protocol("connection is not in POP3 mode".into())),
        }
    }

    /// Write a protocol line, appending CRLF.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let transport = self.transport_mut()?;
        transport.write_all(line.as_bytes()).await?;
        transport.write_all(b"\r\n").await?;
        transport.flush().await?;
        Ok(())
    }

    /// Write raw bytes verbatim.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let transport = self.transport_mut()?;
        transport.write_all(bytes).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Shut the transport down cleanly.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.as_mut() {
            transport.shutdown().await?;
        }
        self.transport = None;
        Ok(())
    }
}
