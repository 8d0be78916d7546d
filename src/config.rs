//! Mail server connection configuration

use crate::error::{Error, Result};
use std::env;

/// Connection-time security for a mail server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plaintext connection, no upgrade.
    #[default]
    None,
    /// Implicit TLS from the first byte.
    Tls,
    /// Plaintext connect, then a STARTTLS upgrade.
    StartTls,
}

/// Connection configuration shared by the IMAP, SMTP and POP3 clients.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub security: Security,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification. Needed for bridges and
    /// self-hosted servers with self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl MailConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::None,
            username: String::new(),
            password: String::new(),
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Load configuration from environment variables with the given
    /// prefix (`IMAP`, `SMTP` or `POP3`).
    ///
    /// Reads from `.env` if present. Required variables:
    /// - `<PREFIX>_PORT`
    /// - `<PREFIX>_USERNAME`
    /// - `<PREFIX>_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `<PREFIX>_HOST` (default: `127.0.0.1`)
    /// - `<PREFIX>_SECURITY` (`none`, `tls`, `starttls`; default `none`)
    /// - `<PREFIX>_ACCEPT_INVALID_CERTS` (default `false`)
    pub fn from_env(prefix: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let var = |name: &str| env::var(format!("{prefix}_{name}"));

        let security = match var("SECURITY").as_deref() {
            Ok("tls") => Security::Tls,
            Ok("starttls") => Security::StartTls,
            Ok("none") | Err(_) => Security::None,
            Ok(other) => {
                return Err(Error::Config(format!(
                    "Invalid {prefix}_SECURITY: {other}"
                )));
            }
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var("PORT")
                .map_err(|_| Error::Config(format!("{prefix}_PORT not set")))?
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {prefix}_PORT: {e}")))?,
            security,
            username: var("USERNAME")
                .map_err(|_| Error::Config(format!("{prefix}_USERNAME not set")))?,
            password: var("PASSWORD")
                .map_err(|_| Error::Config(format!("{prefix}_PASSWORD not set")))?,
            accept_invalid_certs: var("ACCEPT_INVALID_CERTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}
