#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Async mail protocol client library
//!
//! Speaks IMAP4rev1 (with the IDLE, METADATA, UIDPLUS, MOVE,
//! CONDSTORE, QRESYNC and ENABLE extensions), SMTP and POP3 over
//! plaintext or TLS, and parses/builds MIME messages with
//! Quoted-Printable and Base64 transfer encodings.
//!
//! The protocol engine is layered bottom-up: a framing layer turns
//! the byte stream into response units (IMAP literals included), a
//! scheduler correlates tagged commands with their responses, typed
//! parsers produce mailbox lists, message trees and metadata, and
//! unsolicited server pushes surface on a per-client event bus.

mod config;
mod connection;
mod error;
mod events;
mod framer;
mod pop;
mod smtp;
mod transport;

pub mod imap;
pub mod mime;

pub use config::{MailConfig, Security};
pub use error::{Error, Result};
pub use events::{EventBus, MailEvent};
pub use framer::{Frame, Framer, FramerMode, PopReply, ResponseUnit, SmtpReply};
pub use imap::{
    Flag, GenericImapResult, ImapClient, Mailbox, MailboxFlag, MetaDataDepth, MetaDataEntry,
    Response, ResponseCode, SelectionState, ServerInfo, Status, StatusItem, StoreAction,
};
pub use mime::{Address, Attachment, Body, Envelope, Header, MessageBuilder, MimeMessage};
pub use pop::Pop3Client;
pub use smtp::SmtpClient;
pub use transport::Transport;
