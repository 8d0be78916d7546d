//! IMAP mailboxes
//!
//! A [`Mailbox`] carries the server-canonical path, the display name
//! (last path segment), the name attributes from LIST, and the counts
//! learned from the most recent SELECT/EXAMINE/STATUS responses.

use crate::imap::flag::Flag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A mailbox name attribute as returned by LIST/LSUB.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MailboxFlag {
    /// `\Noselect` — the name cannot be selected.
    Noselect,
    /// `\Noinferiors` — no child mailboxes can exist below it.
    Noinferiors,
    /// `\Marked`.
    Marked,
    /// `\Unmarked`.
    Unmarked,
    /// `\HasChildren`.
    HasChildren,
    /// `\HasNoChildren`.
    HasNoChildren,
    /// Any other attribute token, verbatim.
    Other(String),
}

impl MailboxFlag {
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Noselect => "\\Noselect",
            Self::Noinferiors => "\\Noinferiors",
            Self::Marked => "\\Marked",
            Self::Unmarked => "\\Unmarked",
            Self::HasChildren => "\\HasChildren",
            Self::HasNoChildren => "\\HasNoChildren",
            Self::Other(token) => token,
        }
    }
}

impl From<&str> for MailboxFlag {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("\\Noselect") {
            Self::Noselect
        } else if s.eq_ignore_ascii_case("\\Noinferiors") {
            Self::Noinferiors
        } else if s.eq_ignore_ascii_case("\\Marked") {
            Self::Marked
        } else if s.eq_ignore_ascii_case("\\Unmarked") {
            Self::Unmarked
        } else if s.eq_ignore_ascii_case("\\HasChildren") {
            Self::HasChildren
        } else if s.eq_ignore_ascii_case("\\HasNoChildren") {
            Self::HasNoChildren
        } else {
            Self::Other(s.to_string())
        }
    }
}

/// Whether a mailbox is currently open on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionState {
    #[default]
    Unselected,
    /// Opened read-write via SELECT.
    Selected,
    /// Opened read-only via EXAMINE.
    Examined,
}

/// An IMAP mailbox and the state last reported for it by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mailbox {
    /// Server-canonical path.
    pub path: String,
    /// Last path segment.
    pub name: String,
    /// Hierarchy separator reported alongside this mailbox.
    pub separator: Option<char>,
    /// Name attributes from LIST/LSUB.
    pub flags: Vec<MailboxFlag>,
    /// True when the mailbox came from LSUB.
    pub is_subscribed: bool,
    /// Flags applicable to messages in this mailbox (`* FLAGS`).
    pub message_flags: Vec<Flag>,
    /// Flags the client may change permanently (`PERMANENTFLAGS`).
    pub permanent_flags: Vec<Flag>,
    pub messages_exists: u32,
    pub messages_recent: u32,
    /// Unseen message count (STATUS UNSEEN).
    pub unseen: Option<u32>,
    /// Sequence number of the first unseen message (SELECT `[UNSEEN n]`).
    pub first_unseen: Option<u32>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    /// CONDSTORE highest modification sequence; `None` when the
    /// server announced NOMODSEQ.
    pub highest_mod_seq: Option<u64>,
    pub selection: SelectionState,
}

impl Mailbox {
    /// Create a mailbox from its server path, deriving the display
    /// name from the last path segment.
    #[must_use]
    pub fn new(path: impl Into<String>, separator: Option<char>) -> Self {
        let path = path.into();
        let name = separator
            .and_then(|sep| path.rsplit(sep).next())
            .unwrap_or(path.as_str())
            .to_string();
        Self {
            path,
            name,
            separator,
            ..Self::default()
        }
    }

    /// True unless the server marked the name `\Noselect`.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.flags.contains(&MailboxFlag::Noselect)
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        self.flags.contains(&MailboxFlag::HasChildren)
    }

    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.path.eq_ignore_ascii_case("INBOX")
    }

    #[must_use]
    pub const fn is_selected(&self) -> bool {
        matches!(
            self.selection,
            SelectionState::Selected | SelectionState::Examined
        )
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_last_segment() {
        let mb = Mailbox::new("Work/Projects/2026", Some('/'));
        assert_eq!(mb.name, "2026");
        assert_eq!(mb.path, "Work/Projects/2026");
    }

    #[test]
    fn name_without_separator() {
        let mb = Mailbox::new("INBOX", None);
        assert_eq!(mb.name, "INBOX");
        assert!(mb.is_inbox());
    }

    #[test]
    fn noselect_is_not_selectable() {
        let mut mb = Mailbox::new("Archive", Some('/'));
        assert!(mb.is_selectable());
        mb.flags.push(MailboxFlag::Noselect);
        assert!(!mb.is_selectable());
    }

    #[test]
    fn flag_wire_round_trip() {
        for token in ["\\Noselect", "\\HasChildren", "\\Marked", "\\Remote"] {
            assert_eq!(MailboxFlag::from(token).as_imap_str(), token);
        }
    }

    #[test]
    fn inbox_case_insensitive() {
        assert!(Mailbox::new("inbox", None).is_inbox());
        assert!(Mailbox::new("INBOX", None).is_inbox());
        assert!(!Mailbox::new("Inbox/Sub", Some('/')).is_inbox());
    }
}
