//! Outgoing IMAP commands
//!
//! A [`Command`] is the text of one command split at its literal
//! boundaries. Part zero is written with the tag; every further part
//! waits for a `+` continuation request from the server before it is
//! sent (SETMETADATA and APPEND with literal values, multi-entry
//! metadata updates, ...).

/// An IMAP command ready for submission.
#[derive(Debug, Clone)]
pub struct Command {
    /// First line, without tag or CRLF.
    pub(crate) text: String,
    /// Remaining parts, each sent after one continuation request.
    pub(crate) continuations: Vec<Vec<u8>>,
    /// Redact everything after the verb in logs (LOGIN).
    pub(crate) redact: bool,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            continuations: Vec::new(),
            redact: false,
        }
    }

    /// A command whose arguments must not appear in logs.
    pub fn redacted(text: impl Into<String>) -> Self {
        Self {
            redact: true,
            ..Self::new(text)
        }
    }

    #[must_use]
    pub fn with_continuation(mut self, part: Vec<u8>) -> Self {
        self.continuations.push(part);
        self
    }

    /// The command text as it may appear in logs.
    #[must_use]
    pub fn log_text(&self) -> &str {
        if self.redact {
            self.text.split(' ').next().unwrap_or(&self.text)
        } else {
            &self.text
        }
    }
}

/// Quote a string for use as an IMAP astring argument.
///
/// Atom-safe strings pass through unchanged; everything else is
/// wrapped in double quotes with `\` escapes for `"` and `\`.
#[must_use]
pub fn quote_astring(value: &str) -> String {
    let atom_safe = !value.is_empty()
        && value.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'+' | b'/' | b':' | b'=')
        });
    if atom_safe {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
