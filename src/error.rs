//! Error types for mail-client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Syntactically invalid server response. Fatal for the session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The framer buffered more than its cap without finding a
    /// complete response unit.
    #[error("response exceeded {0} bytes without a complete unit")]
    ProtocolOverflow(usize),

    /// Command-level refusal reported by the server (IMAP `NO`/`BAD`,
    /// SMTP 4yz/5yz, POP3 `-ERR`).
    #[error("server status {code}: {message}")]
    ServerStatus { code: String, message: String },

    /// Server-initiated termination (`* BYE` outside LOGOUT).
    #[error("server closed the session: {0}")]
    Bye(String),

    /// Caller contract violated, e.g. no mailbox selected.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Transport error or EOF. Fails all in-flight work.
    #[error("connection lost")]
    ConnectionLost,

    /// The server requested a continuation the command could not
    /// provide, or denied one the client had begun.
    #[error("continuation aborted: {0}")]
    ContinuationAborted(String),

    /// The caller withdrew interest in an outstanding command.
    #[error("operation cancelled")]
    Cancelled,

    #[error("MIME parsing error: {0}")]
    Mime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, Error>;
