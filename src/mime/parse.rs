//! MIME parsing
//!
//! Byte-level parsing of RFC 2822/2045 messages: header unfolding,
//! structured `Content-Type`/`Content-Disposition` values with RFC
//! 2231 parameters, transfer-encoding removal, charset decoding and
//! recursive multipart handling.

use crate::error::{Error, Result};
use crate::mime::encodings::{base64_decode, decode_charset, qp_decode};
use crate::mime::message::{Body, Header, MimeMessage};

/// A parsed structured header value: `type/subtype` plus parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentType {
    /// Lowercased `type/subtype`.
    pub media_type: String,
    /// Parameters in appearance order, names lowercased, values
    /// unquoted and RFC 2231-decoded.
    pub params: Vec<(String, String)>,
}

impl ContentType {
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a message (or message part) into a [`MimeMessage`] tree.
pub fn parse(bytes: &[u8]) -> Result<MimeMessage> {
    let (header_bytes, body_bytes) = split_message(bytes);
    let headers = parse_headers(header_bytes);
    let mut message = MimeMessage {
        headers,
        ..MimeMessage::default()
    };

    let content_type = message
        .header("Content-Type")
        .map(parse_content_type)
        .unwrap_or_default();

    if content_type.media_type.starts_with("multipart/") {
        let boundary = content_type.parameter("boundary").ok_or_else(|| {
            Error::Mime(format!(
                "{} part without a boundary parameter",
                content_type.media_type
            ))
        })?;
        let mut children = Vec::new();
        for part in split_multipart(body_bytes, boundary) {
            children.push(parse(part)?);
        }
        message.body = Body::Multipart(children);
        return Ok(message);
    }

    let encoding = message
        .header("Content-Transfer-Encoding")
        .map(str::trim)
        .unwrap_or("7bit")
        .to_ascii_lowercase();
    let decoded = match encoding.as_str() {
        "quoted-printable" => qp_decode(body_bytes),
        // A base64 body that fails to decode is kept verbatim rather
        // than failing the whole message.
        "base64" => base64_decode(body_bytes).unwrap_or_else(|| body_bytes.to_vec()),
        _ => body_bytes.to_vec(),
    };

    let is_text = content_type.media_type.is_empty()
        || content_type.media_type.starts_with("text/")
        || content_type.media_type.starts_with("message/");
    message.body = if is_text {
        let charset = content_type.parameter("charset").unwrap_or("us-ascii");
        Body::Text(decode_charset(charset, &decoded))
    } else {
        Body::Raw(decoded)
    };
    Ok(message)
}

/// Split raw bytes at the blank line separating headers from body.
/// Without one, input whose first line is not a header is treated as
/// a bare body.
fn split_message(bytes: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(bytes, b"\r\n\r\n") {
        (&bytes[..pos + 2], &bytes[pos + 4..])
    } else if let Some(pos) = find(bytes, b"\n\n") {
        (&bytes[..pos + 1], &bytes[pos + 2..])
    } else {
        let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
        if first_line.contains(&b':') {
            (bytes, &[])
        } else {
            (&[], bytes)
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a header block, unfolding continuation lines. A line that
/// begins with whitespace extends the previous header's value with
/// the leading whitespace collapsed to a single space.
pub(crate) fn parse_headers(block: &[u8]) -> Vec<Header> {
    let mut headers: Vec<Header> = Vec::new();
    for raw_line in block.split(|&b| b == b'\n') {
        let line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            if let Some(last) = headers.last_mut() {
                let folded = String::from_utf8_lossy(line);
                last.value.push(' ');
                last.value.push_str(folded.trim_start());
            }
            continue;
        }
        let text = String::from_utf8_lossy(line);
        match text.split_once(':') {
            Some((name, value)) => {
                headers.push(Header::new(name.trim(), value.trim_start()));
            }
            None => {
                // A stray line without a colon; keep it as a nameless
                // header so emitting does not silently drop bytes.
                headers.push(Header::new(text.trim_end(), ""));
            }
        }
    }
    headers
}

/// Parse a structured header value (`Content-Type`,
/// `Content-Disposition`) into its leading token and parameters.
#[must_use]
pub fn parse_content_type(value: &str) -> ContentType {
    let mut sections = split_unquoted(value, ';').into_iter();
    let media_type = sections
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    // Raw attribute list; RFC 2231 continuations are merged below.
    let mut raw: Vec<(String, String, bool)> = Vec::new();
    for section in sections {
        let Some((name, val)) = section.split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let val = unquote(val.trim());
        let extended = name.ends_with('*');
        raw.push((name, val, extended));
    }

    let mut params: Vec<(String, String)> = Vec::new();
    for (name, val, extended) in raw {
        // name, name*, name*0, name*0* all collapse to "name".
        let base = name
            .trim_end_matches('*')
            .rsplit_once('*')
            .filter(|(_, idx)| idx.chars().all(|c| c.is_ascii_digit()))
            .map_or_else(
                || name.trim_end_matches('*').to_string(),
                |(base, _)| base.to_string(),
            );
        let decoded = if extended {
            decode_rfc2231_value(&val)
        } else {
            val
        };
        if let Some((_, existing)) = params.iter_mut().find(|(n, _)| *n == base) {
            existing.push_str(&decoded);
        } else {
            params.push((base, decoded));
        }
    }

    ContentType { media_type, params }
}

/// Decode an RFC 2231 extended value: `charset'language'percent-text`.
/// Continuation segments after the first carry only percent-escapes.
fn decode_rfc2231_value(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(charset), Some(_lang), Some(escaped)) => {
            decode_charset(charset, &percent_decode(escaped))
        }
        _ => String::from_utf8_lossy(&percent_decode(value)).into_owned(),
    }
}

fn percent_decode(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).and_then(|pair| {
                let hi = hex_digit(pair[0])?;
                let lo = hex_digit(pair[1])?;
                Some((hi << 4) | lo)
            });
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Split on `separator` outside of double quotes.
fn split_unquoted(value: &str, separator: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, ch) in value.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

/// Remove surrounding quotes and backslash escapes.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Split a multipart body on `--boundary` delimiter lines. The
/// preamble before the first delimiter and the epilogue after the
/// closing `--boundary--` are discarded.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let marker = format!("--{boundary}");
    let marker = marker.as_bytes();
    let mut parts = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut pos = 0;

    while pos <= body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i);
        let end = line_end.unwrap_or(body.len());
        let line = &body[pos..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.starts_with(marker) {
            let tail = &line[marker.len()..];
            let is_final = tail.starts_with(b"--");
            if let Some(start) = current_start.take() {
                let mut content_end = pos;
                if content_end >= start + 2 && &body[content_end - 2..content_end] == b"\r\n" {
                    content_end -= 2;
                } else if content_end >= start + 1 && body[content_end - 1] == b'\n' {
                    content_end -= 1;
                }
                parts.push(&body[start..content_end]);
            }
            if is_final {
                return parts;
            }
            current_start = Some(end + 1);
        }

        let Some(found) = line_end else { break };
        pos = found + 1;
    }
    // Unterminated multipart: keep whatever content was open.
    if let Some(start) = current_start {
        if start <= body.len() {
            parts.push(&body[start..]);
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_message() {
        let raw = b"From: alice@example.com\r\n\
                    To: bob@example.com\r\n\
                    Subject: Hi\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    Hello Bob\r\n";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.header("From"), Some("alice@example.com"));
        assert_eq!(msg.subject().as_deref(), Some("Hi"));
        assert_eq!(msg.text(), Some("Hello Bob\r\n"));
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = b"Subject: a very\r\n\tlong subject\r\nX-Tag: one\r\n continues\r\n\r\n";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.header("Subject"), Some("a very long subject"));
        assert_eq!(msg.header("X-Tag"), Some("one continues"));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let raw = b"CONTENT-TYPE: text/plain\r\n\r\nbody";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.media_type(), "text/plain");
    }

    #[test]
    fn decodes_quoted_printable_body() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
                    Content-Transfer-Encoding: quoted-printable\r\n\
                    \r\n\
                    caf=E9";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.text(), Some("café"));
    }

    #[test]
    fn decodes_base64_body_to_raw() {
        let raw = b"Content-Type: application/octet-stream\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    AAEC/w==";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.body, Body::Raw(vec![0, 1, 2, 255]));
    }

    #[test]
    fn parses_content_type_with_quoted_param() {
        let ct = parse_content_type("multipart/mixed; boundary=\"b;with;semis\"");
        assert_eq!(ct.media_type, "multipart/mixed");
        assert_eq!(ct.parameter("boundary"), Some("b;with;semis"));
    }

    #[test]
    fn merges_rfc2231_continuations() {
        let ct = parse_content_type(
            "application/x-stuff; title*0=\"part one \"; title*1=\"and two\"",
        );
        assert_eq!(ct.parameter("title"), Some("part one and two"));
    }

    #[test]
    fn decodes_rfc2231_charset_value() {
        let ct = parse_content_type(
            "application/x-stuff; title*=us-ascii'en-us'This%20is%20%2A%2A%2Afun%2A%2A%2A",
        );
        assert_eq!(ct.parameter("title"), Some("This is ***fun***"));
    }

    #[test]
    fn parses_nested_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\
                    \r\n\
                    preamble to be ignored\r\n\
                    --outer\r\n\
                    Content-Type: multipart/alternative; boundary=inner\r\n\
                    \r\n\
                    --inner\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    plain version\r\n\
                    --inner\r\n\
                    Content-Type: text/html\r\n\
                    \r\n\
                    <p>html version</p>\r\n\
                    --inner--\r\n\
                    --outer\r\n\
                    Content-Type: application/octet-stream\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    AQID\r\n\
                    --outer--\r\n\
                    epilogue\r\n";
        let msg = parse(raw).unwrap();
        let Body::Multipart(outer) = &msg.body else {
            panic!("expected multipart");
        };
        assert_eq!(outer.len(), 2);
        let Body::Multipart(inner) = &outer[0].body else {
            panic!("expected nested multipart");
        };
        assert_eq!(inner[0].text(), Some("plain version"));
        assert_eq!(inner[1].text(), Some("<p>html version</p>"));
        assert_eq!(outer[1].body, Body::Raw(vec![1, 2, 3]));
    }

    #[test]
    fn multipart_without_boundary_is_an_error() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        assert!(parse(raw).is_err());
    }

    #[test]
    fn round_trip_preserves_tree() {
        let raw = b"From: alice@example.com\r\n\
                    Subject: tree\r\n\
                    Content-Type: multipart/mixed; boundary=xyz\r\n\
                    \r\n\
                    --xyz\r\n\
                    Content-Type: text/plain; charset=iso-8859-1\r\n\
                    Content-Transfer-Encoding: quoted-printable\r\n\
                    \r\n\
                    na=EFve\r\n\
                    --xyz\r\n\
                    Content-Type: application/octet-stream\r\n\
                    Content-Transfer-Encoding: base64\r\n\
                    \r\n\
                    AAECAwQF\r\n\
                    --xyz--\r\n";
        let first = parse(raw).unwrap();
        let emitted = first.to_bytes().unwrap();
        let second = parse(&emitted).unwrap();
        assert_eq!(first, second);
    }
}
