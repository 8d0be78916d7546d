//! MIME message model, parser, builder and codecs
//!
//! - [`message`] — the message tree (`MimeMessage`, headers, bodies)
//! - [`parse`] — RFC 2045/2047/2231 parsing
//! - [`build`] — multipart message construction
//! - [`encodings`] — Quoted-Printable, Base64 and charset codecs

mod build;
mod message;
mod parse;

pub mod encodings;

pub use build::{Attachment, MessageBuilder};
pub use message::{Address, Body, Envelope, Header, MimeMessage};
pub use parse::{parse, parse_content_type, ContentType};
