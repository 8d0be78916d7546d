//! Transfer encodings and charsets
//!
//! Quoted-Printable and Base64 transfer codecs, RFC 2047 encoded-word
//! decoding for header values, and the charset repertoire the library
//! commits to: ASCII, UTF-8 and ISO-8859-1. Unknown charsets decode
//! as Latin-1 so no input byte is ever lost.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Soft line length for encoded output.
const ENCODED_LINE_LEN: usize = 76;

/// Decode a Quoted-Printable body (RFC 2045 §6.7).
///
/// `=XX` hex escapes are decoded, `=CRLF` soft breaks are removed,
/// and malformed escapes pass through verbatim rather than failing
/// the message.
#[must_use]
pub fn qp_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }
        // Soft line break: "=\r\n" (tolerating a bare "=\n").
        if input.get(i + 1) == Some(&b'\r') && input.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        if input.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        match (
            input.get(i + 1).copied().and_then(hex_value),
            input.get(i + 2).copied().and_then(hex_value),
        ) {
            (Some(hi), Some(lo)) => {
                out.push((hi << 4) | lo);
                i += 3;
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Encode bytes as Quoted-Printable with soft breaks at 76 columns.
///
/// CRLF sequences in the input are kept as hard line breaks. `=`,
/// control and 8-bit bytes are escaped; a space or tab immediately
/// before a line break is escaped so it survives transport.
#[must_use]
pub fn qp_encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 8);
    let mut col = 0;

    let mut push_encoded = |out: &mut Vec<u8>, col: &mut usize, b: u8| {
        if *col + 3 > ENCODED_LINE_LEN - 1 {
            out.extend_from_slice(b"=\r\n");
            *col = 0;
        }
        out.extend_from_slice(format!("={b:02X}").as_bytes());
        *col += 3;
    };

    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == b'\r' && input.get(i + 1) == Some(&b'\n') {
            out.extend_from_slice(b"\r\n");
            col = 0;
            i += 2;
            continue;
        }
        let at_line_end = matches!(&input[i + 1..], [] | [b'\r', b'\n', ..]);
        let literal = matches!(b, b'\t' | b' '..=b'~') && b != b'=' && !(at_line_end && (b == b' ' || b == b'\t'));
        if literal {
            if col + 1 > ENCODED_LINE_LEN - 1 {
                out.extend_from_slice(b"=\r\n");
                col = 0;
            }
            out.push(b);
            col += 1;
        } else {
            push_encoded(&mut out, &mut col, b);
        }
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Decode Base64, ignoring embedded whitespace and line breaks.
#[must_use]
pub fn base64_decode(input: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64.decode(compact).ok()
}

/// Encode bytes as Base64 folded at 76 columns with CRLF.
#[must_use]
pub fn base64_encode_wrapped(input: &[u8]) -> Vec<u8> {
    let encoded = BASE64.encode(input);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / ENCODED_LINE_LEN * 2 + 2);
    for chunk in encoded.as_bytes().chunks(ENCODED_LINE_LEN) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Encode without folding (for encoded words and SASL exchanges).
#[must_use]
pub fn base64_encode(input: &[u8]) -> String {
    BASE64.encode(input)
}

/// Decode bytes in the named charset.
///
/// ASCII and UTF-8 decode lossily (invalid sequences become U+FFFD);
/// ISO-8859-1 and every unknown charset map bytes 1:1 to the first
/// 256 code points.
#[must_use]
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    if charset.eq_ignore_ascii_case("utf-8")
        || charset.eq_ignore_ascii_case("utf8")
        || charset.eq_ignore_ascii_case("us-ascii")
        || charset.eq_ignore_ascii_case("ascii")
    {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        // ISO-8859-1 and the fallback for unknown charsets.
        bytes.iter().map(|&b| char::from(b)).collect()
    }
}

/// Encode text in the named charset. Characters outside the charset
/// become `?`.
#[must_use]
pub fn encode_charset(charset: &str, text: &str) -> Vec<u8> {
    if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        text.chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect()
    } else if charset.eq_ignore_ascii_case("us-ascii") || charset.eq_ignore_ascii_case("ascii") {
        text.chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect()
    } else {
        text.as_bytes().to_vec()
    }
}

/// Decode RFC 2047 encoded words in an unstructured header value.
///
/// Handles `=?charset?Q?...?=` and `=?charset?B?...?=`; whitespace
/// between two adjacent encoded words is elided per RFC 2047 §6.2.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut last_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = parse_encoded_word(candidate) {
            let elide = last_was_encoded
                && !before.is_empty()
                && before.chars().all(char::is_whitespace);
            if !elide {
                out.push_str(before);
            }
            out.push_str(&decoded);
            last_was_encoded = true;
            rest = &candidate[consumed..];
        } else {
            out.push_str(before);
            out.push_str("=?");
            last_was_encoded = false;
            rest = &candidate[2..];
        }
    }
    out.push_str(rest);
    out
}

/// Parse one encoded word at the start of `input`; returns the
/// decoded text and the byte length consumed.
fn parse_encoded_word(input: &str) -> Option<(String, usize)> {
    let inner = input.strip_prefix("=?")?;
    let charset_end = inner.find('?')?;
    let charset_token = &inner[..charset_end];
    let after_charset = &inner[charset_end + 1..];
    let encoding = after_charset.chars().next()?;
    if !encoding.is_ascii() {
        return None;
    }
    let after_encoding = after_charset.get(1..)?.strip_prefix('?')?;
    let payload_end = after_encoding.find("?=")?;
    let payload = &after_encoding[..payload_end];

    // Strip an RFC 2231 language suffix ("utf-8*en").
    let charset = charset_token.split('*').next().unwrap_or(charset_token);

    let bytes = match encoding.to_ascii_uppercase() {
        'Q' => q_decode(payload),
        'B' => base64_decode(payload.as_bytes())?,
        _ => return None,
    };
    // "=?" charset "?" encoding "?" payload "?="
    let consumed = 2 + charset_end + 1 + 1 + 1 + payload_end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

/// The Q encoding of RFC 2047: `_` is space, `=XX` is a hex escape.
fn q_decode(payload: &str) -> Vec<u8> {
    let unspaced: Vec<u8> = payload
        .bytes()
        .map(|b| if b == b'_' { b' ' } else { b })
        .collect();
    qp_decode(&unspaced)
}

/// Encode an unstructured header value, producing an encoded word
/// only when the text is not pure ASCII.
#[must_use]
pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    let mut encoded = String::from("=?utf-8?B?");
    encoded.push_str(&base64_encode(value.as_bytes()));
    encoded.push_str("?=");
    encoded
}
