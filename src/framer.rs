//! Response framing
//!
//! Turns the raw byte stream from a mail server into protocol response
//! units. The framer is a pure state machine over a [`BytesMut`]
//! buffer, implemented as a [`Decoder`] so it can be unit-tested
//! without sockets and driven by the connection read loop.
//!
//! Three modes:
//!
//! - **IMAP**: a unit is a logical line that may embed counted
//!   literals. A line ending in `{N}` continues with exactly N raw
//!   bytes (which may contain CRLF) followed by more line content,
//!   repeating until a line ends without a literal marker.
//! - **SMTP**: a reply is one or more `DDD-text` lines closed by a
//!   `DDD text` line; all lines must carry the same code.
//! - **POP3**: a `+OK`/`-ERR` status line, optionally followed by a
//!   dot-stuffed multi-line body terminated by a lone `.` when the
//!   owning client announced one via [`Framer::expect_multiline`].

use crate::error::Error;
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Maximum bytes buffered while waiting for a complete unit.
const MAX_UNIT_SIZE: usize = 64 * 1024 * 1024;

/// Protocol spoken on the connection, selected by the owning client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerMode {
    Imap,
    Smtp,
    Pop3,
}

/// One IMAP response unit.
///
/// `head` is the first line's text before any literal; each entry in
/// `parts` pairs a literal's raw bytes with the line text that
/// followed it. The `{N}` markers themselves are consumed by the
/// framer; downstream parsers access literal bytes positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseUnit {
    pub head: String,
    pub parts: Vec<(Vec<u8>, String)>,
}

impl ResponseUnit {
    #[must_use]
    pub fn line(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            parts: Vec::new(),
        }
    }

    /// The raw bytes of the literal at `index`, if present.
    #[must_use]
    pub fn literal(&self, index: usize) -> Option<&[u8]> {
        self.parts.get(index).map(|(bytes, _)| bytes.as_slice())
    }
}

/// One SMTP reply: the shared three-digit code and the text of each
/// line, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_transient_failure(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent_failure(&self) -> bool {
        self.code >= 500
    }

    /// All line texts joined with a single space.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }
}

/// One POP3 reply. `body` is present only for multi-line responses
/// and holds the de-stuffed content with CRLF line endings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopReply {
    pub ok: bool,
    pub message: String,
    pub body: Option<Vec<u8>>,
}

/// A complete response unit in whichever mode the framer runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Imap(ResponseUnit),
    Smtp(SmtpReply),
    Pop(PopReply),
}

#[derive(Debug)]
pub struct Framer {
    mode: FramerMode,
    max_unit: usize,
    /// POP3 only: the next `+OK` reply carries a dot-terminated body.
    multiline: bool,
}

impl Framer {
    #[must_use]
    pub const fn new(mode: FramerMode) -> Self {
        Self {
            mode,
            max_unit: MAX_UNIT_SIZE,
            multiline: false,
        }
    }

    /// Announce that the next POP3 `+OK` reply is multi-line
    /// (LIST/RETR/TOP/UIDL without argument). Resets after one reply.
    pub fn expect_multiline(&mut self) {
        self.multiline = true;
    }

    fn check_overflow(&self, buffered: usize) -> Result<(), Error> {
        if buffered > self.max_unit {
            Err(Error::ProtocolOverflow(self.max_unit))
        } else {
            Ok(())
        }
    }

    fn decode_imap(&self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let mut segments: Vec<String> = Vec::new();
        let mut literals: Vec<Vec<u8>> = Vec::new();
        let mut pos = 0;

        let consumed = loop {
            let Some(eol) = find_crlf(&src[pos..]) else {
                self.check_overflow(src.len())?;
                return Ok(None);
            };
            let line_end = pos + eol;
            let line = &src[pos..line_end];

            match trailing_literal_len(line) {
                Some((text_len, lit_len)) => {
                    let lit_start = line_end + 2;
                    if src.len() < lit_start + lit_len {
                        self.check_overflow(src.len())?;
                        return Ok(None);
                    }
                    segments.push(String::from_utf8_lossy(&line[..text_len]).into_owned());
                    literals.push(src[lit_start..lit_start + lit_len].to_vec());
                    pos = lit_start + lit_len;
                }
                None => {
                    segments.push(String::from_utf8_lossy(line).into_owned());
                    break line_end + 2;
                }
            }
        };

        src.advance(consumed);

        let mut segments = segments.into_iter();
        let head = segments.next().unwrap_or_default();
        let parts = literals.into_iter().zip(segments).collect();
        Ok(Some(Frame::Imap(ResponseUnit { head, parts })))
    }

    fn decode_smtp(&self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let mut lines: Vec<String> = Vec::new();
        let mut code: Option<u16> = None;
        let mut pos = 0;

        loop {
            let Some(eol) = find_crlf(&src[pos..]) else {
                self.check_overflow(src.len())?;
                return Ok(None);
            };
            let line_end = pos + eol;
            let line = &src[pos..line_end];

            if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
                return Err(Error::Protocol(format!(
                    "malformed SMTP reply line: {:?}",
                    String::from_utf8_lossy(line)
                )));
            }
            let line_code: u16 = std::str::from_utf8(&line[..3])
                .expect("digits are ASCII")
                .parse()
                .expect("three digits fit in u16");
            match code {
                None => code = Some(line_code),
                Some(expected) if expected != line_code => {
                    return Err(Error::Protocol(format!(
                        "inconsistent SMTP reply codes: {expected} then {line_code}"
                    )));
                }
                Some(_) => {}
            }

            let (is_final, text) = match line.get(3) {
                None => (true, ""),
                Some(b' ') => (true, text_of(&line[4..])),
                Some(b'-') => (false, text_of(&line[4..])),
                Some(other) => {
                    return Err(Error::Protocol(format!(
                        "invalid SMTP reply separator: {:?}",
                        *other as char
                    )));
                }
            };
            lines.push(text.to_string());
            pos = line_end + 2;

            if is_final {
                src.advance(pos);
                return Ok(Some(Frame::Smtp(SmtpReply {
                    code: code.expect("code set on first line"),
                    lines,
                })));
            }
        }
    }

    fn decode_pop(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        let Some(eol) = find_crlf(src) else {
            self.check_overflow(src.len())?;
            return Ok(None);
        };
        let status_line = String::from_utf8_lossy(&src[..eol]).into_owned();
        let (ok, message) = if let Some(rest) = status_line.strip_prefix("+OK") {
            (true, rest.trim_start().to_string())
        } else if let Some(rest) = status_line.strip_prefix("-ERR") {
            (false, rest.trim_start().to_string())
        } else {
            return Err(Error::Protocol(format!(
                "malformed POP3 status line: {status_line:?}"
            )));
        };

        if !(self.multiline && ok) {
            src.advance(eol + 2);
            self.multiline = false;
            return Ok(Some(Frame::Pop(PopReply {
                ok,
                message,
                body: None,
            })));
        }

        // Collect the dot-terminated body following the status line.
        let mut body = Vec::new();
        let mut pos = eol + 2;
        loop {
            let Some(line_eol) = find_crlf(&src[pos..]) else {
                self.check_overflow(src.len())?;
                return Ok(None);
            };
            let line = &src[pos..pos + line_eol];
            pos += line_eol + 2;

            if line == b"." {
                src.advance(pos);
                self.multiline = false;
                return Ok(Some(Frame::Pop(PopReply {
                    ok,
                    message,
                    body: Some(body),
                })));
            }
            // Unstuff a leading dot.
            let content = if line.first() == Some(&b'.') {
                &line[1..]
            } else {
                line
            };
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
    }
}

impl Decoder for Framer {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.mode {
            FramerMode::Imap => self.decode_imap(src),
            FramerMode::Smtp => self.decode_smtp(src),
            FramerMode::Pop3 => self.decode_pop(src),
        }
    }
}

/// Index of the `\r` of the first CRLF in `data`, if any.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// If the line's last non-whitespace token is a literal marker `{N}`,
/// returns the text length before the marker and the literal length.
fn trailing_literal_len(line: &[u8]) -> Option<(usize, usize)> {
    let trimmed = line.len() - line.iter().rev().take_while(|b| **b == b' ').count();
    let line = &line[..trimmed];
    if line.last() != Some(&b'}') {
        return None;
    }
    let open = line.iter().rposition(|b| *b == b'{')?;
    let digits = &line[open + 1..line.len() - 1];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((open, len))
}

fn text_of(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or_default()
}
