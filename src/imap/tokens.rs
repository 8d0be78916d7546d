//! Tokenizer for IMAP response units
//!
//! Splits the text of a [`ResponseUnit`] into atoms, quoted strings,
//! parenthesized list markers and literal payloads. Parsers walk the
//! token stream through a [`TokenCursor`] instead of re-scanning raw
//! text.
//!
//! Atoms deliberately include `[`, `]`, `<` and `>` so FETCH item
//! keys like `BODY[HEADER]<0>` arrive as a single token. Quoted
//! strings are unescaped (`\"` and `\\`). Literals reference the raw
//! bytes captured by the framer.

use crate::error::{Error, Result};
use crate::framer::ResponseUnit;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(String),
    Quoted(String),
    Literal(Vec<u8>),
    ListOpen,
    ListClose,
}

impl Token {
    /// True for the unquoted atom `NIL`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Atom(a) if a.eq_ignore_ascii_case("NIL"))
    }
}

fn scan_text(text: &str, out: &mut VecDeque<Token>) {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' => i += 1,
            b'(' => {
                out.push_back(Token::ListOpen);
                i += 1;
            }
            b')' => {
                out.push_back(Token::ListClose);
                i += 1;
            }
            b'"' => {
                let mut value = String::new();
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' if i + 1 < bytes.len() => {
                            value.push(bytes[i + 1] as char);
                            i += 2;
                        }
                        b'"' => {
                            i += 1;
                            break;
                        }
                        _ => {
                            let start = i;
                            while i < bytes.len() && !matches!(bytes[i], b'\\' | b'"') {
                                i += 1;
                            }
                            value.push_str(&text[start..i]);
                        }
                    }
                }
                out.push_back(Token::Quoted(value));
            }
            _ => {
                let start = i;
                while i < bytes.len() && !matches!(bytes[i], b' ' | b'(' | b')' | b'"') {
                    i += 1;
                }
                out.push_back(Token::Atom(text[start..i].to_string()));
            }
        }
    }
}

/// Forward-only cursor over the tokens of one response unit.
#[derive(Debug)]
pub struct TokenCursor {
    tokens: VecDeque<Token>,
}

impl TokenCursor {
    #[must_use]
    pub fn new(unit: &ResponseUnit) -> Self {
        let mut tokens = VecDeque::new();
        scan_text(&unit.head, &mut tokens);
        for (literal, text) in &unit.parts {
            tokens.push_back(Token::Literal(literal.clone()));
            scan_text(text, &mut tokens);
        }
        Self { tokens }
    }

    #[must_use]
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn expect_atom(&mut self) -> Result<String> {
        match self.next_token() {
            Some(Token::Atom(a)) => Ok(a),
            other => Err(unexpected("atom", other.as_ref())),
        }
    }

    pub fn expect_u32(&mut self) -> Result<u32> {
        let atom = self.expect_atom()?;
        atom.parse()
            .map_err(|_| Error::Protocol(format!("expected number, found {atom:?}")))
    }

    pub fn expect_u64(&mut self) -> Result<u64> {
        let atom = self.expect_atom()?;
        atom.parse()
            .map_err(|_| Error::Protocol(format!("expected number, found {atom:?}")))
    }

    pub fn expect_list_open(&mut self) -> Result<()> {
        match self.next_token() {
            Some(Token::ListOpen) => Ok(()),
            other => Err(unexpected("(", other.as_ref())),
        }
    }

    /// An nstring: `NIL`, a quoted string, a literal, or a bare atom
    /// (tolerated because some servers skip quoting).
    pub fn expect_nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token() {
            Some(token) if token.is_nil() => Ok(None),
            Some(Token::Quoted(s) | Token::Atom(s)) => Ok(Some(s.into_bytes())),
            Some(Token::Literal(bytes)) => Ok(Some(bytes)),
            other => Err(unexpected("string", other.as_ref())),
        }
    }

    /// An nstring decoded as text; `NIL` becomes the empty string.
    pub fn expect_string(&mut self) -> Result<String> {
        Ok(self
            .expect_nstring()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default())
    }

    /// The tokens of one balanced parenthesized list, without the
    /// outer markers.
    pub fn expect_list(&mut self) -> Result<Vec<Token>> {
        self.expect_list_open()?;
        let mut depth = 1;
        let mut inner = Vec::new();
        loop {
            match self.next_token() {
                Some(Token::ListOpen) => {
                    depth += 1;
                    inner.push(Token::ListOpen);
                }
                Some(Token::ListClose) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(inner);
                    }
                    inner.push(Token::ListClose);
                }
                Some(token) => inner.push(token),
                None => return Err(Error::Protocol("unterminated list".into())),
            }
        }
    }

    /// Discard one value: an atom, string, literal, `NIL`, or a whole
    /// balanced list.
    pub fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(Token::ListOpen) => {
                self.expect_list()?;
                Ok(())
            }
            Some(_) => {
                self.next_token();
                Ok(())
            }
            None => Err(Error::Protocol("expected a value".into())),
        }
    }
}

fn unexpected(wanted: &str, got: Option<&Token>) -> Error {
    Error::Protocol(format!("expected {wanted}, found {got:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(head: &str) -> ResponseUnit {
        ResponseUnit::line(head)
    }

    #[test]
    fn tokenizes_list_line() {
        let mut cursor = TokenCursor::new(&unit("* LIST (\\Noselect) \"/\" \"\""));
        assert_eq!(cursor.next_token(), Some(Token::Atom("*".to_string())));
        assert_eq!(cursor.next_token(), Some(Token::Atom("LIST".to_string())));
        assert_eq!(cursor.next_token(), Some(Token::ListOpen));
        assert_eq!(cursor.next_token(), Some(Token::Atom("\\Noselect".to_string())));
        assert_eq!(cursor.next_token(), Some(Token::ListClose));
        assert_eq!(cursor.next_token(), Some(Token::Quoted("/".to_string())));
        assert_eq!(cursor.next_token(), Some(Token::Quoted(String::new())));
        assert_eq!(cursor.next_token(), None);
    }

    #[test]
    fn quoted_unescapes() {
        let mut cursor = TokenCursor::new(&unit(r#""a \"b\" \\ c""#));
        assert_eq!(cursor.next_token(), Some(Token::Quoted(r#"a "b" \ c"#.to_string())));
    }

    #[test]
    fn literal_tokens_interleave() {
        let u = ResponseUnit {
            head: "* 1 FETCH (BODY[] ".to_string(),
            parts: vec![(b"Hello world".to_vec(), ")".to_string())],
        };
        let mut cursor = TokenCursor::new(&u);
        cursor.expect_atom().unwrap();
        assert_eq!(cursor.expect_u32().unwrap(), 1);
        cursor.expect_atom().unwrap();
        cursor.expect_list_open().unwrap();
        assert_eq!(cursor.expect_atom().unwrap(), "BODY[]");
        assert_eq!(
            cursor.expect_nstring().unwrap().as_deref(),
            Some(b"Hello world".as_slice())
        );
        assert_eq!(cursor.next_token(), Some(Token::ListClose));
    }

    #[test]
    fn body_section_is_one_atom() {
        let mut cursor = TokenCursor::new(&unit("BODY[HEADER.FIELDS (From To)]<0>"));
        // The parenthesized field list splits the atom; FETCH keys with
        // embedded lists are re-joined by the fetch parser.
        assert_eq!(cursor.expect_atom().unwrap(), "BODY[HEADER.FIELDS");
    }

    #[test]
    fn nested_lists_balance() {
        let mut cursor = TokenCursor::new(&unit("(a (b c) d)"));
        let inner = cursor.expect_list().unwrap();
        assert_eq!(
            inner,
            vec![
                Token::Atom("a".to_string()),
                Token::ListOpen,
                Token::Atom("b".to_string()),
                Token::Atom("c".to_string()),
                Token::ListClose,
                Token::Atom("d".to_string()),
            ]
        );
    }

    #[test]
    fn nil_detection() {
        let mut cursor = TokenCursor::new(&unit("NIL nil \"NIL\""));
        assert_eq!(cursor.expect_nstring().unwrap(), None);
        assert_eq!(cursor.expect_nstring().unwrap(), None);
        // A quoted "NIL" is the three-letter string, not nil.
        assert_eq!(
            cursor.expect_nstring().unwrap().as_deref(),
            Some(b"NIL".as_slice())
        );
    }
}
