//! Multipart message construction
//!
//! Assembles a [`MimeMessage`] tree from abstract parts (plain text,
//! HTML, attachments), generating boundaries guaranteed not to occur
//! in any part and emitting headers in canonical order.

use crate::error::{Error, Result};
use crate::mime::encodings::encode_header_value;
use crate::mime::message::{Body, Header, MimeMessage};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest line a generated message may contain (RFC 5322 §2.1.1).
const MAX_LINE_LEN: usize = 998;

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// A file attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Builder for outgoing messages.
///
/// ```
/// use mail_client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("alice@example.com")
///     .to("bob@example.com")
///     .subject("Hello")
///     .text_body("Hi Bob!")
///     .build()
///     .unwrap();
/// assert_eq!(message.header("From"), Some("alice@example.com"));
/// ```
#[derive(Debug, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: Option<String>,
    message_id: Option<String>,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    #[must_use]
    pub fn attachment(
        mut self,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            media_type: media_type.into(),
            data,
        });
        self
    }

    /// Assemble the message tree.
    pub fn build(self) -> Result<MimeMessage> {
        let from = self
            .from
            .ok_or_else(|| Error::Mime("a message requires a From address".into()))?;
        if self.to.is_empty() {
            return Err(Error::Mime("a message requires at least one recipient".into()));
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(Error::Mime("a message requires a text or HTML body".into()));
        }

        let mut content = match (&self.text, &self.html) {
            (Some(text), None) => text_part(text, "text/plain"),
            (None, Some(html)) => text_part(html, "text/html"),
            (Some(text), Some(html)) => {
                let children = vec![text_part(text, "text/plain"), text_part(html, "text/html")];
                multipart("multipart/alternative", children)?
            }
            (None, None) => unreachable!("checked above"),
        };

        if !self.attachments.is_empty() {
            let mut children = vec![content];
            for attachment in self.attachments {
                children.push(attachment_part(&attachment));
            }
            content = multipart("multipart/mixed", children)?;
        }

        // Canonical header order at the top level.
        let mut headers = Vec::new();
        headers.push(Header::new("From", from.clone()));
        headers.push(Header::new("To", self.to.join(", ")));
        if !self.cc.is_empty() {
            headers.push(Header::new("Cc", self.cc.join(", ")));
        }
        if !self.bcc.is_empty() {
            headers.push(Header::new("Bcc", self.bcc.join(", ")));
        }
        if let Some(subject) = &self.subject {
            headers.push(Header::new("Subject", encode_header_value(subject)));
        }
        headers.push(Header::new("Date", Utc::now().to_rfc2822()));
        headers.push(Header::new(
            "Message-ID",
            self.message_id
                .unwrap_or_else(|| generate_message_id(&from)),
        ));
        headers.push(Header::new("MIME-Version", "1.0"));
        headers.extend(content.headers);
        content.headers = headers;
        Ok(content)
    }
}

/// A text leaf. Quoted-Printable is used whenever 7bit would not
/// survive transport (8-bit bytes or over-long lines).
fn text_part(text: &str, media_type: &str) -> MimeMessage {
    let normalized = normalize_crlf(text);
    let needs_encoding = !normalized.is_ascii()
        || normalized
            .split("\r\n")
            .any(|line| line.len() > MAX_LINE_LEN - 2);
    let mut headers = vec![Header::new(
        "Content-Type",
        format!("{media_type}; charset=utf-8"),
    )];
    headers.push(Header::new(
        "Content-Transfer-Encoding",
        if needs_encoding {
            "quoted-printable"
        } else {
            "7bit"
        },
    ));
    MimeMessage {
        headers,
        body: Body::Text(normalized),
        ..MimeMessage::default()
    }
}

fn attachment_part(attachment: &Attachment) -> MimeMessage {
    MimeMessage {
        headers: vec![
            Header::new(
                "Content-Type",
                format!("{}; name=\"{}\"", attachment.media_type, attachment.filename),
            ),
            Header::new("Content-Transfer-Encoding", "base64"),
            Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", attachment.filename),
            ),
        ],
        body: Body::Raw(attachment.data.clone()),
        ..MimeMessage::default()
    }
}

/// Wrap children in a multipart node with a fresh boundary that does
/// not occur verbatim in any serialized child.
fn multipart(media_type: &str, children: Vec<MimeMessage>) -> Result<MimeMessage> {
    let serialized: Vec<Vec<u8>> = children
        .iter()
        .map(MimeMessage::to_bytes)
        .collect::<Result<_>>()?;
    let boundary = loop {
        let candidate = generate_boundary();
        if !serialized
            .iter()
            .any(|bytes| find_sub(bytes, candidate.as_bytes()))
        {
            break candidate;
        }
    };
    Ok(MimeMessage {
        headers: vec![Header::new(
            "Content-Type",
            format!("{media_type}; boundary=\"{boundary}\""),
        )],
        body: Body::Multipart(children),
        ..MimeMessage::default()
    })
}

fn generate_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("=_part_{seq:08x}_{nanos:08x}")
}

fn generate_message_id(from: &str) -> String {
    let domain = from.rsplit('@').next().filter(|d| !d.is_empty());
    let domain = domain.unwrap_or("localhost").trim_end_matches('>');
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("<{micros:x}.{seq:x}@{domain}>")
}

fn normalize_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("\r\n");
            }
            '\n' | '\r' => out.push_str("\r\n"),
            _ => out.push(ch),
        }
    }
    out
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::parse::{parse, parse_content_type};

    #[test]
    fn builds_single_part_message() {
        let message = MessageBuilder::new()
            .from("alice@example.com")
            .to("bob@example.com")
            .subject("Greetings")
            .text_body("Hello Bob!\nSecond line.")
            .build()
            .unwrap();
        assert_eq!(message.header("MIME-Version"), Some("1.0"));
        assert_eq!(message.text(), Some("Hello Bob!\r\nSecond line."));

        let names: Vec<&str> = message.headers.iter().map(|h| h.name.as_str()).collect();
        let canonical = ["From", "To", "Subject", "Date", "Message-ID", "MIME-Version"];
        let positions: Vec<usize> = canonical
            .iter()
            .map(|name| names.iter().position(|n| n == name).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn builds_alternative_for_text_and_html() {
        let message = MessageBuilder::new()
            .from("a@x")
            .to("b@y")
            .text_body("plain")
            .html_body("<p>html</p>")
            .build()
            .unwrap();
        assert!(message.media_type().starts_with("multipart/alternative"));
        let Body::Multipart(children) = &message.body else {
            panic!("expected multipart");
        };
        assert_eq!(children[0].media_type(), "text/plain");
        assert_eq!(children[1].media_type(), "text/html");
    }

    #[test]
    fn attachments_produce_mixed_tree() {
        let message = MessageBuilder::new()
            .from("a@x")
            .to("b@y")
            .text_body("see attachment")
            .attachment("data.bin", "application/octet-stream", vec![0, 1, 2])
            .build()
            .unwrap();
        assert_eq!(message.media_type(), "multipart/mixed");
        let Body::Multipart(children) = &message.body else {
            panic!("expected multipart");
        };
        assert_eq!(children.len(), 2);
        assert!(
            children[1]
                .header("Content-Disposition")
                .unwrap()
                .contains("data.bin")
        );
    }

    #[test]
    fn boundary_does_not_occur_in_parts() {
        let message = MessageBuilder::new()
            .from("a@x")
            .to("b@y")
            .text_body("plain")
            .html_body("<p>html</p>")
            .build()
            .unwrap();
        let boundary = parse_content_type(message.header("Content-Type").unwrap())
            .parameter("boundary")
            .unwrap()
            .to_string();
        let Body::Multipart(children) = &message.body else {
            panic!("expected multipart");
        };
        for child in children {
            assert!(!find_sub(&child.to_bytes().unwrap(), boundary.as_bytes()));
        }
    }

    #[test]
    fn built_message_round_trips() {
        let message = MessageBuilder::new()
            .from("alice@example.com")
            .to("bob@example.com")
            .subject("Grüße aus Berlin")
            .text_body("Liebe Grüße,\nAlice")
            .attachment("a.bin", "application/octet-stream", (0..=255).collect())
            .build()
            .unwrap();
        let bytes = message.to_bytes().unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.subject().as_deref(), Some("Grüße aus Berlin"));
        let plain = parsed.plain_text_part().unwrap();
        assert_eq!(plain.text(), Some("Liebe Grüße,\r\nAlice"));
    }

    #[test]
    fn no_line_exceeds_the_limit() {
        let long_line = "x".repeat(5000);
        let message = MessageBuilder::new()
            .from("a@x")
            .to("b@y")
            .text_body(long_line)
            .attachment("big.bin", "application/octet-stream", vec![0xAB; 4096])
            .build()
            .unwrap();
        let bytes = message.to_bytes().unwrap();
        for line in bytes.split(|&b| b == b'\n') {
            assert!(line.len() <= MAX_LINE_LEN + 1, "line too long: {}", line.len());
        }
    }
}
