//! IMAP response and session data types

use crate::error::{Error, Result};
use crate::imap::flag::Flag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Completion condition of an IMAP command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
    Bye,
}

impl Status {
    fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" | "PREAUTH" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::Bye => "BYE",
        })
    }
}

/// The bracketed hint inside a status line, e.g. `[UIDVALIDITY 3857]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Alert,
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidValidity(u32),
    UidNext(u32),
    Unseen(u32),
    PermanentFlags(Vec<Flag>),
    HighestModSeq(u64),
    NoModSeq,
    Capability(Vec<String>),
    /// UIDPLUS `[COPYUID validity source destination]`.
    CopyUid {
        uid_validity: u32,
        source: String,
        destination: String,
    },
    /// UIDPLUS `[APPENDUID validity uid]`.
    AppendUid { uid_validity: u32, uids: String },
    Other {
        name: String,
        params: Option<String>,
    },
}

impl ResponseCode {
    /// Parse the text between `[` and `]`.
    fn parse(inner: &str) -> Self {
        let (name_raw, rest) = inner.split_once(' ').unwrap_or((inner, ""));
        let name = name_raw.to_ascii_uppercase();
        let rest = rest.trim();
        match name.as_str() {
            "ALERT" => Self::Alert,
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "TRYCREATE" => Self::TryCreate,
            "NOMODSEQ" => Self::NoModSeq,
            "UIDVALIDITY" => parse_u32(rest).map_or_else(|| other(&name, rest), Self::UidValidity),
            "UIDNEXT" => parse_u32(rest).map_or_else(|| other(&name, rest), Self::UidNext),
            "UNSEEN" => parse_u32(rest).map_or_else(|| other(&name, rest), Self::Unseen),
            "HIGHESTMODSEQ" => rest
                .parse::<u64>()
                .map_or_else(|_| other(&name, rest), Self::HighestModSeq),
            "PERMANENTFLAGS" => {
                let inner = rest.trim_start_matches('(').trim_end_matches(')');
                Self::PermanentFlags(inner.split_whitespace().map(Flag::from).collect())
            }
            "CAPABILITY" => {
                Self::Capability(rest.split_whitespace().map(str::to_string).collect())
            }
            "COPYUID" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(validity), Some(source), Some(destination)) => {
                        parse_u32(validity).map_or_else(
                            || other(&name, rest),
                            |uid_validity| Self::CopyUid {
                                uid_validity,
                                source: source.to_string(),
                                destination: destination.to_string(),
                            },
                        )
                    }
                    _ => other(&name, rest),
                }
            }
            "APPENDUID" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(validity), Some(uids)) => parse_u32(validity).map_or_else(
                        || other(&name, rest),
                        |uid_validity| Self::AppendUid {
                            uid_validity,
                            uids: uids.to_string(),
                        },
                    ),
                    _ => other(&name, rest),
                }
            }
            _ => other(&name, rest),
        }
    }
}

fn other(name: &str, rest: &str) -> ResponseCode {
    ResponseCode::Other {
        name: name.to_string(),
        params: if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        },
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// A parsed status line: `<tag|*> <OK|NO|BAD|BYE> [code] message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// `None` for untagged (`*`) status lines.
    pub tag: Option<String>,
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub message: String,
}

impl StatusLine {
    /// Parse a status line, returning `None` when the line is not one
    /// (e.g. `* 23 EXISTS` or `* LIST ...`).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let (first, rest) = match line.split_once(' ') {
            Some(pair) => pair,
            None => (line, ""),
        };
        let tag = if first == "*" {
            None
        } else {
            Some(first.to_string())
        };
        let (word, remainder) = match rest.split_once(' ') {
            Some(pair) => pair,
            None => (rest, ""),
        };
        let status = Status::from_word(word)?;

        let (code, message) = if let Some(after_open) = remainder.strip_prefix('[') {
            after_open.split_once(']').map_or_else(
                || (None, remainder.to_string()),
                |(inner, text)| {
                    (
                        Some(ResponseCode::parse(inner)),
                        text.trim_start().to_string(),
                    )
                },
            )
        } else {
            (None, remainder.to_string())
        };

        Some(Self {
            tag,
            status,
            code,
            message,
        })
    }
}

/// The typed outcome of one IMAP command.
///
/// `NO`/`BAD` refusals are values here, not [`Error`]s; use
/// [`Response::into_result`] when a refusal should become one.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub message: Option<String>,
    pub result: Option<T>,
}

impl<T> Response<T> {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }

    /// Re-wrap the envelope around a different result value.
    pub(crate) fn with_result<U>(self, result: Option<U>) -> Response<U> {
        Response {
            status: self.status,
            code: self.code,
            message: self.message,
            result,
        }
    }

    /// The parsed result, or the server's refusal as an [`Error`].
    pub fn into_result(self) -> Result<T> {
        let message = self.message.clone().unwrap_or_default();
        match self.status {
            Status::Ok => self.result.ok_or_else(|| {
                Error::Protocol("command completed without a parsed result".into())
            }),
            Status::Bye => Err(Error::Bye(message)),
            status => Err(Error::ServerStatus {
                code: status.to_string(),
                message,
            }),
        }
    }
}

/// Session-scoped facts about the connected server.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub is_secure: bool,
    /// Hierarchy separator learned from the first LIST response.
    pub path_separator: Option<char>,
    /// Raw text of the last capability announcement.
    pub capability_text: Option<String>,
    pub capabilities: Vec<String>,
}

impl ServerInfo {
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|cap| cap.eq_ignore_ascii_case(name))
    }

    pub(crate) fn set_capabilities(&mut self, capabilities: Vec<String>) {
        self.capability_text = Some(capabilities.join(" "));
        self.capabilities = capabilities;
    }

    pub(crate) fn clear_capabilities(&mut self) {
        self.capability_text = None;
        self.capabilities.clear();
    }
}

/// One annotation in the METADATA extension (RFC 5464).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataEntry {
    /// Owning mailbox; empty for server-global annotations.
    pub mailbox_name: String,
    /// Entry path beginning with `/private/` or `/shared/`.
    pub entry: String,
    /// Opaque value; `None` deletes the entry.
    pub value: Option<Vec<u8>>,
}

impl MetaDataEntry {
    #[must_use]
    pub fn new(
        mailbox_name: impl Into<String>,
        entry: impl Into<String>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            mailbox_name: mailbox_name.into(),
            entry: entry.into(),
            value,
        }
    }

    /// The value as text, when present and valid UTF-8.
    #[must_use]
    pub fn value_text(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Depth option for GETMETADATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetaDataDepth {
    /// Only the requested entries.
    #[default]
    None,
    /// The entries and their direct children.
    DirectChildren,
    /// The entries and all descendants.
    AllChildren,
}

impl MetaDataDepth {
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::DirectChildren => "1",
            Self::AllChildren => "infinity",
        }
    }
}

/// How STORE combines the given flags with the message's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Add,
    Remove,
    Replace,
}

impl StoreAction {
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS",
            Self::Remove => "-FLAGS",
            Self::Replace => "FLAGS",
        }
    }
}

/// Items requestable via STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
    HighestModSeq,
}

impl StatusItem {
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// Result of commands whose interesting payload is the response-code
/// hint on the tagged line (COPY, APPEND, STARTTLS, ...).
#[derive(Debug, Clone, Default)]
pub struct GenericImapResult {
    pub response_code: Option<ResponseCode>,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_ok_with_code() {
        let line = StatusLine::parse("a2 OK [READ-WRITE] SELECT completed").unwrap();
        assert_eq!(line.tag.as_deref(), Some("a2"));
        assert_eq!(line.status, Status::Ok);
        assert_eq!(line.code, Some(ResponseCode::ReadWrite));
        assert_eq!(line.message, "SELECT completed");
    }

    #[test]
    fn parses_untagged_ok_uidvalidity() {
        let line = StatusLine::parse("* OK [UIDVALIDITY 3857529045] UIDs valid").unwrap();
        assert_eq!(line.tag, None);
        assert_eq!(line.code, Some(ResponseCode::UidValidity(3_857_529_045)));
    }

    #[test]
    fn parses_capability_code() {
        let line = StatusLine::parse("a0 OK [CAPABILITY IMAP4rev1 IDLE] logged in").unwrap();
        assert_eq!(
            line.code,
            Some(ResponseCode::Capability(vec![
                "IMAP4rev1".to_string(),
                "IDLE".to_string()
            ]))
        );
    }

    #[test]
    fn parses_copyuid() {
        let line = StatusLine::parse("a5 OK [COPYUID 38505 304,319 3956:3957] Done").unwrap();
        assert_eq!(
            line.code,
            Some(ResponseCode::CopyUid {
                uid_validity: 38505,
                source: "304,319".to_string(),
                destination: "3956:3957".to_string(),
            })
        );
    }

    #[test]
    fn parses_permanentflags() {
        let line = StatusLine::parse("* OK [PERMANENTFLAGS (\\Seen \\*)] Limited").unwrap();
        assert_eq!(
            line.code,
            Some(ResponseCode::PermanentFlags(vec![
                Flag::Seen,
                Flag::Wildcard
            ]))
        );
    }

    #[test]
    fn non_status_lines_are_rejected() {
        assert_eq!(StatusLine::parse("* 23 EXISTS"), None);
        assert_eq!(StatusLine::parse("* LIST (\\Noselect) \"/\" \"\""), None);
        assert_eq!(StatusLine::parse("+ idling"), None);
    }

    #[test]
    fn bye_is_a_status() {
        let line = StatusLine::parse("* BYE server shutting down").unwrap();
        assert_eq!(line.status, Status::Bye);
        assert_eq!(line.message, "server shutting down");
    }

    #[test]
    fn response_into_result_maps_refusals() {
        let refusal: Response<()> = Response {
            status: Status::No,
            code: None,
            message: Some("denied".to_string()),
            result: None,
        };
        assert!(matches!(
            refusal.into_result(),
            Err(Error::ServerStatus { code, message }) if code == "NO" && message == "denied"
        ));
    }
}
