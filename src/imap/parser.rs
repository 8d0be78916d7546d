//! Per-command response parsers
//!
//! Each IMAP command pairs with a parser that consumes the untagged
//! units it owns and produces the command's typed result when the
//! tagged line arrives. Parsers declare interest explicitly through
//! [`ResponseParser::accepts_untagged`]; declined units flow to the
//! session's unsolicited path (mailbox updates and the event bus).

use crate::error::{Error, Result};
use crate::framer::ResponseUnit;
use crate::imap::flag::Flag;
use crate::imap::mailbox::{Mailbox, MailboxFlag, SelectionState};
use crate::imap::tokens::{Token, TokenCursor};
use crate::imap::types::{
    GenericImapResult, MetaDataEntry, ResponseCode, Status, StatusLine,
};
use crate::mime;
use crate::mime::encodings::decode_encoded_words;
use crate::mime::{Address, Body, Envelope, MimeMessage};
use chrono::DateTime;

/// The seam between the scheduler and a command's result handling.
pub(crate) trait ResponseParser {
    type Output;

    /// Whether this parser consumes the given untagged unit.
    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool;

    /// Consume an accepted untagged unit.
    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()>;

    /// Produce the typed result once the tagged line arrived.
    fn finish(self, status: &StatusLine) -> Result<Option<Self::Output>>;
}

/// Text after `* <verb> `, when the unit's verb matches.
fn untagged_rest<'a>(unit: &'a ResponseUnit, verb: &str) -> Option<&'a str> {
    let rest = unit.head.strip_prefix("* ")?;
    let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
    word.eq_ignore_ascii_case(verb).then_some(tail)
}

/// The count of `* <n> <verb>` units (EXISTS, RECENT, EXPUNGE, FETCH).
pub(crate) fn untagged_numeric(unit: &ResponseUnit, verb: &str) -> Option<u32> {
    let rest = unit.head.strip_prefix("* ")?;
    let mut words = rest.split_whitespace();
    let n: u32 = words.next()?.parse().ok()?;
    words.next()?.eq_ignore_ascii_case(verb).then_some(n)
}

fn flags_from_tokens(tokens: Vec<Token>) -> Vec<Flag> {
    tokens
        .into_iter()
        .filter_map(|token| match token {
            Token::Atom(a) => Some(Flag::from(a.as_str())),
            Token::Quoted(q) => Some(Flag::from(q.as_str())),
            _ => None,
        })
        .collect()
}

// ---- CAPABILITY ----

#[derive(Default)]
pub(crate) struct CapabilityParser {
    capabilities: Vec<String>,
}

impl ResponseParser for CapabilityParser {
    type Output = Vec<String>;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_rest(unit, "CAPABILITY").is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        if let Some(rest) = untagged_rest(unit, "CAPABILITY") {
            self.capabilities = rest.split_whitespace().map(str::to_string).collect();
        }
        Ok(())
    }

    fn finish(mut self, status: &StatusLine) -> Result<Option<Self::Output>> {
        // LOGIN and STARTTLS often deliver capabilities as a response
        // code on the tagged line instead of an untagged unit.
        if self.capabilities.is_empty() {
            if let Some(ResponseCode::Capability(caps)) = &status.code {
                self.capabilities = caps.clone();
            }
        }
        Ok(Some(self.capabilities))
    }
}

// ---- LIST / LSUB ----

pub(crate) struct ListParser {
    is_lsub: bool,
    mailboxes: Vec<Mailbox>,
}

impl ListParser {
    pub fn new(is_lsub: bool) -> Self {
        Self {
            is_lsub,
            mailboxes: Vec::new(),
        }
    }

    fn verb(&self) -> &'static str {
        if self.is_lsub { "LSUB" } else { "LIST" }
    }
}

impl ResponseParser for ListParser {
    type Output = Vec<Mailbox>;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_rest(unit, self.verb()).is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        let mut cursor = TokenCursor::new(unit);
        cursor.expect_atom()?; // *
        cursor.expect_atom()?; // LIST / LSUB
        let flags = cursor.expect_list()?;
        let delimiter = cursor
            .expect_nstring()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .and_then(|s| s.chars().next());
        let path = cursor.expect_string()?;

        let mut mailbox = Mailbox::new(path, delimiter);
        mailbox.flags = flags
            .into_iter()
            .filter_map(|token| match token {
                Token::Atom(a) => Some(MailboxFlag::from(a.as_str())),
                _ => None,
            })
            .collect();
        mailbox.is_subscribed = self.is_lsub;
        self.mailboxes.push(mailbox);
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.mailboxes))
    }
}

// ---- SELECT / EXAMINE ----

pub(crate) struct SelectParser {
    mailbox: Mailbox,
    examine: bool,
}

impl SelectParser {
    pub fn new(mailbox: Mailbox, examine: bool) -> Self {
        Self { mailbox, examine }
    }

    fn apply_code(&mut self, code: &ResponseCode) {
        match code {
            ResponseCode::UidValidity(n) => self.mailbox.uid_validity = Some(*n),
            ResponseCode::UidNext(n) => self.mailbox.uid_next = Some(*n),
            ResponseCode::Unseen(n) => self.mailbox.first_unseen = Some(*n),
            ResponseCode::HighestModSeq(n) => self.mailbox.highest_mod_seq = Some(*n),
            ResponseCode::NoModSeq => self.mailbox.highest_mod_seq = None,
            ResponseCode::PermanentFlags(flags) => {
                self.mailbox.permanent_flags = flags.clone();
            }
            _ => {}
        }
    }
}

impl ResponseParser for SelectParser {
    type Output = Mailbox;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_numeric(unit, "EXISTS").is_some()
            || untagged_numeric(unit, "RECENT").is_some()
            || untagged_rest(unit, "FLAGS").is_some()
            || StatusLine::parse(&unit.head).is_some_and(|s| s.tag.is_none())
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        if let Some(n) = untagged_numeric(unit, "EXISTS") {
            self.mailbox.messages_exists = n;
        } else if let Some(n) = untagged_numeric(unit, "RECENT") {
            self.mailbox.messages_recent = n;
        } else if untagged_rest(unit, "FLAGS").is_some() {
            let mut cursor = TokenCursor::new(unit);
            cursor.expect_atom()?; // *
            cursor.expect_atom()?; // FLAGS
            self.mailbox.message_flags = flags_from_tokens(cursor.expect_list()?);
        } else if let Some(status) = StatusLine::parse(&unit.head) {
            if let Some(code) = &status.code {
                self.apply_code(code);
            }
        }
        Ok(())
    }

    fn finish(mut self, status: &StatusLine) -> Result<Option<Self::Output>> {
        if let Some(code) = &status.code {
            self.apply_code(code);
        }
        let read_only =
            self.examine || matches!(status.code, Some(ResponseCode::ReadOnly));
        self.mailbox.selection = if status.status == Status::Ok {
            if read_only {
                SelectionState::Examined
            } else {
                SelectionState::Selected
            }
        } else {
            SelectionState::Unselected
        };
        Ok(Some(self.mailbox))
    }
}

// ---- STATUS ----

pub(crate) struct StatusParser {
    mailbox: Mailbox,
}

impl StatusParser {
    pub fn new(mailbox: Mailbox) -> Self {
        Self { mailbox }
    }
}

impl ResponseParser for StatusParser {
    type Output = Mailbox;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_rest(unit, "STATUS").is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        let mut cursor = TokenCursor::new(unit);
        cursor.expect_atom()?; // *
        cursor.expect_atom()?; // STATUS
        cursor.expect_nstring()?; // mailbox name, already known
        let mut items = TokenCursor::from_tokens(cursor.expect_list()?);
        while !items.is_empty() {
            let key = items.expect_atom()?.to_ascii_uppercase();
            match key.as_str() {
                "MESSAGES" => self.mailbox.messages_exists = items.expect_u32()?,
                "RECENT" => self.mailbox.messages_recent = items.expect_u32()?,
                "UIDNEXT" => self.mailbox.uid_next = Some(items.expect_u32()?),
                "UIDVALIDITY" => self.mailbox.uid_validity = Some(items.expect_u32()?),
                "UNSEEN" => self.mailbox.unseen = Some(items.expect_u32()?),
                "HIGHESTMODSEQ" => {
                    self.mailbox.highest_mod_seq = Some(items.expect_u64()?);
                }
                _ => items.skip_value()?,
            }
        }
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.mailbox))
    }
}

// ---- SEARCH ----

#[derive(Default)]
pub(crate) struct SearchParser {
    ids: Vec<u32>,
}

impl ResponseParser for SearchParser {
    type Output = Vec<u32>;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_rest(unit, "SEARCH").is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        if let Some(rest) = untagged_rest(unit, "SEARCH") {
            for word in rest.split_whitespace() {
                // A CONDSTORE "(MODSEQ n)" suffix ends the id list.
                if word.starts_with('(') {
                    break;
                }
                let id = word.parse().map_err(|_| {
                    Error::Protocol(format!("invalid SEARCH id: {word:?}"))
                })?;
                self.ids.push(id);
            }
        }
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.ids))
    }
}

// ---- FETCH ----

#[derive(Default)]
pub(crate) struct FetchParser {
    messages: Vec<MimeMessage>,
}

impl ResponseParser for FetchParser {
    type Output = Vec<MimeMessage>;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_numeric(unit, "FETCH").is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        self.messages.push(parse_fetch_unit(unit)?);
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.messages))
    }
}

/// Parse one `* <seq> FETCH (<items>)` unit into a message.
pub(crate) fn parse_fetch_unit(unit: &ResponseUnit) -> Result<MimeMessage> {
    let mut cursor = TokenCursor::new(unit);
    cursor.expect_atom()?; // *
    let sequence_id = cursor.expect_u32()?;
    cursor.expect_atom()?; // FETCH

    let mut message = MimeMessage::new();
    message.sequence_id = Some(sequence_id);

    let mut items = TokenCursor::from_tokens(cursor.expect_list()?);
    while let Some(token) = items.next_token() {
        let Token::Atom(key) = token else {
            return Err(Error::Protocol(format!(
                "unexpected FETCH item token: {token:?}"
            )));
        };
        let key_upper = key.to_ascii_uppercase();
        match key_upper.as_str() {
            "UID" => message.uid = Some(items.expect_u32()?),
            "FLAGS" => message.flags = flags_from_tokens(items.expect_list()?),
            "INTERNALDATE" => {
                let text = items.expect_string()?;
                message.internal_date =
                    DateTime::parse_from_str(&text, "%d-%b-%Y %H:%M:%S %z").ok();
            }
            "RFC822.SIZE" => message.size = Some(items.expect_u32()?),
            "MODSEQ" => {
                let mut inner = TokenCursor::from_tokens(items.expect_list()?);
                message.mod_seq = Some(inner.expect_u64()?);
            }
            "ENVELOPE" => {
                let inner = TokenCursor::from_tokens(items.expect_list()?);
                message.envelope = Some(parse_envelope(inner)?);
            }
            "BODYSTRUCTURE" | "BODY" => items.skip_value()?,
            _ if key_upper.starts_with("BODY[") || key_upper.starts_with("BODY.PEEK[") => {
                let section = complete_section_key(&key_upper, &mut items)?;
                let data = items.expect_nstring()?;
                apply_body_section(&mut message, &section, data)?;
            }
            _ => items.skip_value()?,
        }
    }
    Ok(message)
}

/// FETCH keys like `BODY[HEADER.FIELDS (From To)]` are split by the
/// tokenizer at the embedded list; re-join them into one section key.
fn complete_section_key(key: &str, items: &mut TokenCursor) -> Result<String> {
    if key.contains(']') {
        return Ok(key.to_string());
    }
    let fields = items.expect_list()?;
    let names: Vec<String> = fields
        .into_iter()
        .filter_map(|token| match token {
            Token::Atom(a) => Some(a),
            Token::Quoted(q) => Some(q),
            _ => None,
        })
        .collect();
    let closing = items.expect_atom()?;
    Ok(format!("{key} ({}){closing}", names.join(" ")))
}

/// Attach a fetched body section to the message. A full `BODY[]`
/// fetch parses the bytes into the message's own header and body
/// tree; header-only sections merge headers; anything else lands as
/// raw bytes.
fn apply_body_section(
    message: &mut MimeMessage,
    section: &str,
    data: Option<Vec<u8>>,
) -> Result<()> {
    let Some(data) = data else {
        return Ok(());
    };
    let inner = section
        .trim_start_matches("BODY.PEEK")
        .trim_start_matches("BODY");
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.split(']').next())
        .unwrap_or_default();

    if inner.is_empty() {
        let parsed = mime::parse(&data)?;
        message.headers = parsed.headers;
        message.body = parsed.body;
    } else if inner.starts_with("HEADER") {
        message.headers = mime::parse(&data)?.headers;
    } else {
        message.body = Body::Raw(data);
    }
    Ok(())
}

fn parse_envelope(mut cursor: TokenCursor) -> Result<Envelope> {
    let date = cursor.expect_nstring()?.map(lossy);
    let subject = cursor
        .expect_nstring()?
        .map(|bytes| decode_encoded_words(&lossy(bytes)));
    let from = parse_address_list(&mut cursor)?;
    let sender = parse_address_list(&mut cursor)?;
    let reply_to = parse_address_list(&mut cursor)?;
    let to = parse_address_list(&mut cursor)?;
    let cc = parse_address_list(&mut cursor)?;
    let bcc = parse_address_list(&mut cursor)?;
    let in_reply_to = cursor.expect_nstring()?.map(lossy);
    let message_id = cursor.expect_nstring()?.map(lossy);
    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

fn parse_address_list(cursor: &mut TokenCursor) -> Result<Vec<Address>> {
    match cursor.peek() {
        Some(Token::ListOpen) => {}
        _ => {
            cursor.expect_nstring()?; // NIL
            return Ok(Vec::new());
        }
    }
    let mut groups = TokenCursor::from_tokens(cursor.expect_list()?);
    let mut addresses = Vec::new();
    while matches!(groups.peek(), Some(Token::ListOpen)) {
        let mut fields = TokenCursor::from_tokens(groups.expect_list()?);
        let name = fields
            .expect_nstring()?
            .map(|bytes| decode_encoded_words(&lossy(bytes)));
        fields.expect_nstring()?; // at-domain-list, unused
        let mailbox = fields.expect_nstring()?.map(lossy).unwrap_or_default();
        let host = fields.expect_nstring()?.map(lossy).unwrap_or_default();
        addresses.push(Address {
            name,
            mailbox,
            host,
        });
    }
    Ok(addresses)
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

// ---- METADATA ----

#[derive(Default)]
pub(crate) struct MetaDataParser {
    entries: Vec<MetaDataEntry>,
}

impl ResponseParser for MetaDataParser {
    type Output = Vec<MetaDataEntry>;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_rest(unit, "METADATA").is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        let mut cursor = TokenCursor::new(unit);
        cursor.expect_atom()?; // *
        cursor.expect_atom()?; // METADATA
        let mailbox = cursor.expect_string()?;
        let mut pairs = TokenCursor::from_tokens(cursor.expect_list()?);
        while !pairs.is_empty() {
            let entry = pairs.expect_string()?;
            let value = pairs.expect_nstring()?;
            self.entries
                .push(MetaDataEntry::new(mailbox.clone(), entry, value));
        }
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.entries))
    }
}

// ---- ENABLED ----

#[derive(Default)]
pub(crate) struct EnabledParser {
    capabilities: Vec<String>,
}

impl ResponseParser for EnabledParser {
    type Output = Vec<String>;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        untagged_rest(unit, "ENABLED").is_some()
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        if let Some(rest) = untagged_rest(unit, "ENABLED") {
            self.capabilities
                .extend(rest.split_whitespace().map(str::to_string));
        }
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.capabilities))
    }
}

// ---- NOOP and friends ----

/// Parser for commands without a payload of their own. It claims no
/// untagged units, so mailbox-state updates flow through the
/// session's unsolicited path and fire events.
#[derive(Default)]
pub(crate) struct NoopParser;

impl ResponseParser for NoopParser {
    type Output = ();

    fn accepts_untagged(&self, _unit: &ResponseUnit) -> bool {
        false
    }

    fn parse_untagged(&mut self, _unit: &ResponseUnit) -> Result<()> {
        Ok(())
    }

    fn finish(self, _status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(()))
    }
}

// ---- LOGOUT ----

#[derive(Default)]
pub(crate) struct LogoutParser {
    bye: Option<String>,
}

impl ResponseParser for LogoutParser {
    type Output = String;

    fn accepts_untagged(&self, unit: &ResponseUnit) -> bool {
        StatusLine::parse(&unit.head)
            .is_some_and(|s| s.tag.is_none() && s.status == Status::Bye)
    }

    fn parse_untagged(&mut self, unit: &ResponseUnit) -> Result<()> {
        if let Some(status) = StatusLine::parse(&unit.head) {
            self.bye = Some(status.message);
        }
        Ok(())
    }

    fn finish(self, status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(self.bye.unwrap_or_else(|| status.message.clone())))
    }
}

// ---- generic tagged-line results ----

/// Parser for commands whose interesting payload is the response
/// code on the tagged line (COPY, MOVE, APPEND, STARTTLS, ...).
#[derive(Default)]
pub(crate) struct GenericParser;

impl ResponseParser for GenericParser {
    type Output = GenericImapResult;

    fn accepts_untagged(&self, _unit: &ResponseUnit) -> bool {
        false
    }

    fn parse_untagged(&mut self, _unit: &ResponseUnit) -> Result<()> {
        Ok(())
    }

    fn finish(self, status: &StatusLine) -> Result<Option<Self::Output>> {
        Ok(Some(GenericImapResult {
            response_code: status.code.clone(),
            details: if status.message.is_empty() {
                None
            } else {
                Some(status.message.clone())
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(head: &str) -> ResponseUnit {
        ResponseUnit::line(head)
    }

    fn tagged_ok(parser_tag: &str) -> StatusLine {
        StatusLine::parse(&format!("{parser_tag} OK done")).unwrap()
    }

    #[test]
    fn capability_from_untagged_line() {
        let mut parser = CapabilityParser::default();
        let u = unit("* CAPABILITY IMAP4rev1 IDLE METADATA MOVE");
        assert!(parser.accepts_untagged(&u));
        parser.parse_untagged(&u).unwrap();
        let caps = parser.finish(&tagged_ok("a1")).unwrap().unwrap();
        assert_eq!(caps, ["IMAP4rev1", "IDLE", "METADATA", "MOVE"]);
    }

    #[test]
    fn capability_from_tagged_code() {
        let parser = CapabilityParser::default();
        let status = StatusLine::parse("a0 OK [CAPABILITY IMAP4rev1 IDLE] logged in").unwrap();
        let caps = parser.finish(&status).unwrap().unwrap();
        assert_eq!(caps, ["IMAP4rev1", "IDLE"]);
    }

    #[test]
    fn list_parses_flags_delimiter_and_name() {
        let mut parser = ListParser::new(false);
        let u = unit("* LIST (\\Noselect \\HasChildren) \"/\" \"Work/Projects\"");
        assert!(parser.accepts_untagged(&u));
        parser.parse_untagged(&u).unwrap();
        let boxes = parser.finish(&tagged_ok("a1")).unwrap().unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].path, "Work/Projects");
        assert_eq!(boxes[0].name, "Projects");
        assert_eq!(boxes[0].separator, Some('/'));
        assert!(!boxes[0].is_selectable());
    }

    #[test]
    fn list_with_nil_delimiter() {
        let mut parser = ListParser::new(false);
        parser
            .parse_untagged(&unit("* LIST () NIL INBOX"))
            .unwrap();
        let boxes = parser.finish(&tagged_ok("a1")).unwrap().unwrap();
        assert_eq!(boxes[0].separator, None);
        assert_eq!(boxes[0].path, "INBOX");
    }

    #[test]
    fn lsub_marks_subscription() {
        let mut parser = ListParser::new(true);
        let u = unit("* LSUB () \"/\" \"INBOX\"");
        assert!(parser.accepts_untagged(&u));
        assert!(!parser.accepts_untagged(&unit("* LIST () \"/\" \"INBOX\"")));
        parser.parse_untagged(&u).unwrap();
        let boxes = parser.finish(&tagged_ok("a1")).unwrap().unwrap();
        assert!(boxes[0].is_subscribed);
    }

    #[test]
    fn select_collects_counts_and_codes() {
        let mut parser = SelectParser::new(Mailbox::new("INBOX", Some('/')), false);
        for head in [
            "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)",
            "* 172 EXISTS",
            "* 1 RECENT",
            "* OK [UNSEEN 12] Message 12 is first unseen",
            "* OK [UIDVALIDITY 3857529045] UIDs valid",
            "* OK [UIDNEXT 4392] Predicted next UID",
            "* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited",
            "* OK [HIGHESTMODSEQ 715194045007] Ok",
        ] {
            let u = unit(head);
            assert!(parser.accepts_untagged(&u), "declined: {head}");
            parser.parse_untagged(&u).unwrap();
        }
        let status = StatusLine::parse("a2 OK [READ-WRITE] SELECT completed").unwrap();
        let mailbox = parser.finish(&status).unwrap().unwrap();
        assert_eq!(mailbox.messages_exists, 172);
        assert_eq!(mailbox.messages_recent, 1);
        assert_eq!(mailbox.first_unseen, Some(12));
        assert_eq!(mailbox.uid_validity, Some(3_857_529_045));
        assert_eq!(mailbox.uid_next, Some(4392));
        assert_eq!(mailbox.highest_mod_seq, Some(715_194_045_007));
        assert_eq!(mailbox.message_flags.len(), 5);
        assert_eq!(mailbox.selection, SelectionState::Selected);
    }

    #[test]
    fn examine_results_in_examined_state() {
        let parser = SelectParser::new(Mailbox::new("INBOX", None), true);
        let status = StatusLine::parse("a3 OK [READ-ONLY] EXAMINE completed").unwrap();
        let mailbox = parser.finish(&status).unwrap().unwrap();
        assert_eq!(mailbox.selection, SelectionState::Examined);
    }

    #[test]
    fn status_parses_item_pairs() {
        let mut parser = StatusParser::new(Mailbox::new("blurdybloop", None));
        parser
            .parse_untagged(&unit(
                "* STATUS blurdybloop (MESSAGES 231 RECENT 2 UIDNEXT 44292 UIDVALIDITY 1 UNSEEN 7)",
            ))
            .unwrap();
        let mailbox = parser.finish(&tagged_ok("a4")).unwrap().unwrap();
        assert_eq!(mailbox.messages_exists, 231);
        assert_eq!(mailbox.messages_recent, 2);
        assert_eq!(mailbox.uid_next, Some(44292));
        assert_eq!(mailbox.unseen, Some(7));
    }

    #[test]
    fn search_collects_ordered_ids() {
        let mut parser = SearchParser::default();
        parser.parse_untagged(&unit("* SEARCH 2 84 882")).unwrap();
        let ids = parser.finish(&tagged_ok("a5")).unwrap().unwrap();
        assert_eq!(ids, [2, 84, 882]);
    }

    #[test]
    fn search_stops_at_modseq_suffix() {
        let mut parser = SearchParser::default();
        parser
            .parse_untagged(&unit("* SEARCH 2 5 6 (MODSEQ 917162500)"))
            .unwrap();
        let ids = parser.finish(&tagged_ok("a5")).unwrap().unwrap();
        assert_eq!(ids, [2, 5, 6]);
    }

    #[test]
    fn fetch_parses_flags_uid_and_literal_body() {
        let u = ResponseUnit {
            head: "* 1 FETCH (UID 42 FLAGS (\\Seen) RFC822.SIZE 11 BODY[] ".to_string(),
            parts: vec![(
                b"Subject: hi\r\n\r\nHello world".to_vec(),
                ")".to_string(),
            )],
        };
        let message = parse_fetch_unit(&u).unwrap();
        assert_eq!(message.sequence_id, Some(1));
        assert_eq!(message.uid, Some(42));
        assert_eq!(message.flags, vec![Flag::Seen]);
        assert_eq!(message.size, Some(11));
        assert_eq!(message.header("Subject"), Some("hi"));
        assert_eq!(message.text(), Some("Hello world"));
    }

    #[test]
    fn fetch_parses_quoted_body_section() {
        let message =
            parse_fetch_unit(&unit("* 3 FETCH (BODY[1] \"short text\")")).unwrap();
        assert_eq!(message.body, Body::Raw(b"short text".to_vec()));
    }

    #[test]
    fn fetch_parses_internaldate() {
        let message = parse_fetch_unit(&unit(
            "* 2 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")",
        ))
        .unwrap();
        let date = message.internal_date.unwrap();
        assert_eq!(date.timestamp(), 837_596_665);
    }

    #[test]
    fn fetch_parses_envelope_addresses() {
        let message = parse_fetch_unit(&unit(
            "* 12 FETCH (ENVELOPE (\"Wed, 17 Jul 1996 02:23:25 -0700\" \"IMAP4rev1 WG mtg summary\" ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) NIL NIL ((NIL NIL \"imap\" \"cac.washington.edu\")) NIL NIL NIL \"<B27397-0100000@cac.washington.edu>\"))",
        ))
        .unwrap();
        let envelope = message.envelope.as_ref().unwrap();
        assert_eq!(
            envelope.subject.as_deref(),
            Some("IMAP4rev1 WG mtg summary")
        );
        assert_eq!(envelope.from.len(), 1);
        assert_eq!(envelope.from[0].name.as_deref(), Some("Terry Gray"));
        assert_eq!(envelope.from[0].email(), "gray@cac.washington.edu");
        assert_eq!(envelope.to[0].email(), "imap@cac.washington.edu");
        assert_eq!(
            envelope.message_id.as_deref(),
            Some("<B27397-0100000@cac.washington.edu>")
        );
        assert_eq!(message.from().as_deref(), Some("Terry Gray <gray@cac.washington.edu>"));
    }

    #[test]
    fn fetch_rejoins_header_fields_section() {
        let u = ResponseUnit {
            head: "* 4 FETCH (BODY[HEADER.FIELDS (From Subject)] ".to_string(),
            parts: vec![(
                b"From: a@x\r\nSubject: s\r\n\r\n".to_vec(),
                ")".to_string(),
            )],
        };
        let message = parse_fetch_unit(&u).unwrap();
        assert_eq!(message.header("From"), Some("a@x"));
        assert_eq!(message.header("Subject"), Some("s"));
    }

    #[test]
    fn fetch_skips_bodystructure() {
        let message = parse_fetch_unit(&unit(
            "* 7 FETCH (BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 2279 48) UID 9)",
        ))
        .unwrap();
        assert_eq!(message.uid, Some(9));
    }

    #[test]
    fn metadata_parses_entry_values() {
        let mut parser = MetaDataParser::default();
        let u = unit("* METADATA \"INBOX\" (/private/comment \"My own comment\" /shared/comment NIL)");
        assert!(parser.accepts_untagged(&u));
        parser.parse_untagged(&u).unwrap();
        let entries = parser.finish(&tagged_ok("a6")).unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry, "/private/comment");
        assert_eq!(entries[0].value_text(), Some("My own comment"));
        assert_eq!(entries[1].entry, "/shared/comment");
        assert_eq!(entries[1].value, None);
    }

    #[test]
    fn metadata_parses_literal_value() {
        let mut parser = MetaDataParser::default();
        let u = ResponseUnit {
            head: "* METADATA \"\" (/private/comment ".to_string(),
            parts: vec![(b"line one\r\nline two".to_vec(), ")".to_string())],
        };
        parser.parse_untagged(&u).unwrap();
        let entries = parser.finish(&tagged_ok("a6")).unwrap().unwrap();
        assert_eq!(entries[0].mailbox_name, "");
        assert_eq!(
            entries[0].value.as_deref(),
            Some(b"line one\r\nline two".as_slice())
        );
    }

    #[test]
    fn enabled_collects_capabilities() {
        let mut parser = EnabledParser::default();
        parser
            .parse_untagged(&unit("* ENABLED CONDSTORE QRESYNC"))
            .unwrap();
        let caps = parser.finish(&tagged_ok("a7")).unwrap().unwrap();
        assert_eq!(caps, ["CONDSTORE", "QRESYNC"]);
    }

    #[test]
    fn logout_captures_bye_text() {
        let mut parser = LogoutParser::default();
        let u = unit("* BYE IMAP4rev1 Server logging out");
        assert!(parser.accepts_untagged(&u));
        parser.parse_untagged(&u).unwrap();
        let bye = parser.finish(&tagged_ok("a8")).unwrap().unwrap();
        assert_eq!(bye, "IMAP4rev1 Server logging out");
    }

    #[test]
    fn generic_carries_response_code() {
        let parser = GenericParser;
        let status = StatusLine::parse("a9 OK [APPENDUID 38505 3955] APPEND completed").unwrap();
        let result = parser.finish(&status).unwrap().unwrap();
        assert_eq!(
            result.response_code,
            Some(ResponseCode::AppendUid {
                uid_validity: 38505,
                uids: "3955".to_string()
            })
        );
    }
}
