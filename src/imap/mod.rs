//! IMAP4rev1 client
//!
//! The protocol engine behind [`ImapClient`]: command scheduling and
//! tagging, typed per-command response parsers, mailbox state, and
//! the IDLE loop.

mod client;
mod command;
mod flag;
mod mailbox;
mod parser;
mod session;
mod tokens;
mod types;

pub use client::ImapClient;
pub use flag::Flag;
pub use mailbox::{Mailbox, MailboxFlag, SelectionState};
pub use types::{
    GenericImapResult, MetaDataDepth, MetaDataEntry, Response, ResponseCode, ServerInfo, Status,
    StatusItem, StatusLine, StoreAction,
};
