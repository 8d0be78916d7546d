//! The MIME message tree

use crate::error::{Error, Result};
use crate::imap::Flag;
use crate::mime::encodings::{
    base64_encode_wrapped, decode_encoded_words, encode_charset, qp_encode,
};
use crate::mime::parse::parse_content_type;
use chrono::{DateTime, FixedOffset};
use std::fmt;

/// One message header, with the raw (still encoded) value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The value with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn decoded_value(&self) -> String {
        decode_encoded_words(&self.value)
    }
}

/// The payload of one MIME node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Undecoded or non-text bytes (transfer encoding already removed).
    Raw(Vec<u8>),
    /// Text decoded from the declared charset.
    Text(String),
    /// Child parts of a `multipart/*` node.
    Multipart(Vec<MimeMessage>),
}

impl Default for Body {
    fn default() -> Self {
        Self::Raw(Vec::new())
    }
}

/// An RFC 2822 address as transported in the IMAP ENVELOPE.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub name: Option<String>,
    pub mailbox: String,
    pub host: String,
}

impl Address {
    #[must_use]
    pub fn email(&self) -> String {
        format!("{}@{}", self.mailbox, self.host)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email()),
            None => f.write_str(&self.email()),
        }
    }
}

/// The parsed IMAP ENVELOPE of a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

/// A node in the MIME tree, together with the per-message facts IMAP
/// reports alongside bodies (sequence id, UID, flags, internal date).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MimeMessage {
    pub headers: Vec<Header>,
    pub body: Body,
    pub sequence_id: Option<u32>,
    pub uid: Option<u32>,
    pub flags: Vec<Flag>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub size: Option<u32>,
    pub mod_seq: Option<u64>,
    pub envelope: Option<Envelope>,
}

impl MimeMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First header with the given name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Sender display string; prefers the ENVELOPE, falls back to the
    /// `From` header.
    #[must_use]
    pub fn from(&self) -> Option<String> {
        self.envelope
            .as_ref()
            .and_then(|env| env.from.first())
            .map(ToString::to_string)
            .or_else(|| self.header("From").map(|v| decode_encoded_words(v)))
    }

    /// Recipient display string (first `To` address).
    #[must_use]
    pub fn to(&self) -> Option<String> {
        self.envelope
            .as_ref()
            .and_then(|env| env.to.first())
            .map(ToString::to_string)
            .or_else(|| self.header("To").map(|v| decode_encoded_words(v)))
    }

    /// Decoded subject.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.envelope
            .as_ref()
            .and_then(|env| env.subject.clone())
            .or_else(|| self.header("Subject").map(|v| decode_encoded_words(v)))
    }

    /// `type/subtype` from `Content-Type`, defaulting to `text/plain`.
    #[must_use]
    pub fn media_type(&self) -> String {
        self.header("Content-Type")
            .map_or_else(|| "text/plain".to_string(), |v| parse_content_type(v).media_type)
    }

    /// Body text of this node, when it is a decoded text leaf.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Depth-first search for the first `text/plain` leaf.
    #[must_use]
    pub fn plain_text_part(&self) -> Option<&Self> {
        match &self.body {
            Body::Multipart(children) => children.iter().find_map(Self::plain_text_part),
            _ if self.media_type().eq_ignore_ascii_case("text/plain") => Some(self),
            _ => None,
        }
    }

    /// Serialize the tree back to wire bytes.
    ///
    /// Leaf bodies are re-encoded per the node's declared
    /// `Content-Transfer-Encoding` and charset; multipart children are
    /// delimited by the boundary carried in `Content-Type`. A message
    /// parsed without transformations re-parses to an equal tree.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for header in &self.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(header.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        self.append_body(&mut out)?;
        Ok(out)
    }

    fn append_body(&self, out: &mut Vec<u8>) -> Result<()> {
        match &self.body {
            Body::Multipart(children) => {
                let content_type = self
                    .header("Content-Type")
                    .map(parse_content_type)
                    .ok_or_else(|| Error::Mime("multipart node without Content-Type".into()))?;
                let boundary = content_type
                    .parameter("boundary")
                    .ok_or_else(|| Error::Mime("multipart Content-Type without boundary".into()))?
                    .to_string();
                for child in children {
                    out.extend_from_slice(b"--");
                    out.extend_from_slice(boundary.as_bytes());
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(&child.to_bytes()?);
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(b"--");
                out.extend_from_slice(boundary.as_bytes());
                out.extend_from_slice(b"--\r\n");
                Ok(())
            }
            Body::Text(text) => {
                let charset = self
                    .header("Content-Type")
                    .map(parse_content_type)
                    .and_then(|ct| ct.parameter("charset").map(str::to_string))
                    .unwrap_or_else(|| "utf-8".to_string());
                let bytes = encode_charset(&charset, text);
                self.append_transfer_encoded(&bytes, out);
                Ok(())
            }
            Body::Raw(bytes) => {
                self.append_transfer_encoded(bytes, out);
                Ok(())
            }
        }
    }

    fn append_transfer_encoded(&self, bytes: &[u8], out: &mut Vec<u8>) {
        let encoding = self
            .header("Content-Transfer-Encoding")
            .map(str::trim)
            .unwrap_or("7bit");
        if encoding.eq_ignore_ascii_case("quoted-printable") {
            out.extend_from_slice(&qp_encode(bytes));
        } else if encoding.eq_ignore_ascii_case("base64") {
            out.extend_from_slice(&base64_encode_wrapped(bytes));
        } else {
            out.extend_from_slice(bytes);
        }
    }
}
