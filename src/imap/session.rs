//! Command scheduling and response dispatch
//!
//! One [`ImapSession`] owns the connection, allocates tags, keeps the
//! single in-flight command slot and routes every incoming unit:
//! tagged lines complete the in-flight command, `+` continuations
//! feed multi-part commands, and untagged units go either to the
//! command's parser (when it declares interest) or to the unsolicited
//! path, which updates the selected mailbox and fires events.
//!
//! Commands serialize through `&mut self`; submission order is
//! completion order. A caller that drops an operation mid-flight
//! leaves its tag behind; the tagged response for a stale tag is
//! logged and dropped when it eventually arrives.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::events::{EventBus, MailEvent};
use crate::framer::ResponseUnit;
use crate::imap::command::Command;
use crate::imap::mailbox::Mailbox;
use crate::imap::parser::{self, ResponseParser};
use crate::imap::types::{Response, ServerInfo, Status, StatusLine};
use tracing::{debug, warn};

pub(crate) struct ImapSession {
    conn: Connection,
    tag_seq: u32,
    in_flight: Option<String>,
    stale_tags: Vec<String>,
    idle_tag: Option<String>,
    pub(crate) events: EventBus,
    pub(crate) server_info: ServerInfo,
    pub(crate) selected: Option<Mailbox>,
}

impl ImapSession {
    pub fn new(conn: Connection, events: EventBus, server_info: ServerInfo) -> Self {
        Self {
            conn,
            tag_seq: 0,
            in_flight: None,
            stale_tags: Vec::new(),
            idle_tag: None,
            events,
            server_info,
            selected: None,
        }
    }

    fn next_tag(&mut self) -> String {
        let tag = format!("a{}", self.tag_seq);
        self.tag_seq += 1;
        tag
    }

    /// Read the greeting that servers send before any command.
    pub async fn read_greeting(&mut self) -> Result<()> {
        let unit = self.conn.read_unit().await?;
        let status = StatusLine::parse(&unit.head)
            .ok_or_else(|| Error::Protocol(format!("invalid greeting: {}", unit.head)))?;
        match status.status {
            Status::Ok => {
                if let Some(crate::imap::types::ResponseCode::Capability(caps)) = status.code {
                    self.server_info.set_capabilities(caps);
                }
                debug!("S: greeting: {}", status.message);
                Ok(())
            }
            Status::Bye => Err(Error::Bye(status.message)),
            _ => Err(Error::Protocol(format!(
                "unexpected greeting status: {}",
                unit.head
            ))),
        }
    }

    /// Submit a command and run its parser until the tagged response.
    pub async fn execute<P: ResponseParser>(
        &mut self,
        command: Command,
        mut parser: P,
    ) -> Result<Response<P::Output>> {
        if self.idle_tag.is_some() {
            return Err(Error::PreconditionFailed(
                "a command was submitted while IDLE is active".into(),
            ));
        }
        // A still-recorded tag means the previous operation was
        // dropped mid-flight; its tagged response must be discarded
        // when it arrives.
        if let Some(stale) = self.in_flight.take() {
            self.stale_tags.push(stale);
        }

        let tag = self.next_tag();
        debug!("C: {} {}", tag, command.log_text());
        self.in_flight = Some(tag.clone());
        let line = format!("{tag} {}", command.text);
        self.write_or_fail(line.as_bytes(), true).await?;

        let mut next_part = 0usize;
        loop {
            let unit = match self.conn.read_unit().await {
                Ok(unit) => unit,
                Err(err) => return Err(self.fail_session(err)),
            };

            if unit.head.starts_with("* ") {
                if parser.accepts_untagged(&unit) {
                    parser.parse_untagged(&unit)?;
                } else {
                    self.handle_unsolicited(&unit)?;
                }
                continue;
            }

            if let Some(request) = unit.head.strip_prefix('+') {
                match command.continuations.get(next_part) {
                    Some(part) => {
                        let mut payload = part.clone();
                        payload.extend_from_slice(b"\r\n");
                        self.write_or_fail(&payload, false).await?;
                        next_part += 1;
                    }
                    None => {
                        self.in_flight = None;
                        return Err(Error::ContinuationAborted(request.trim().to_string()));
                    }
                }
                continue;
            }

            let Some(status) = StatusLine::parse(&unit.head) else {
                return Err(self.fail_session(Error::Protocol(format!(
                    "unparsable tagged line: {}",
                    unit.head
                ))));
            };
            if status.tag.as_deref() == Some(tag.as_str()) {
                self.in_flight = None;
                let result = parser.finish(&status)?;
                return Ok(Response {
                    status: status.status,
                    code: status.code,
                    message: if status.message.is_empty() {
                        None
                    } else {
                        Some(status.message)
                    },
                    result,
                });
            }
            let line_tag = status.tag.unwrap_or_default();
            if self.stale_tags.contains(&line_tag) {
                warn!("Dropping response for cancelled command {}", line_tag);
                self.stale_tags.retain(|stale| *stale != line_tag);
            } else {
                warn!("Dropping response with unknown tag {}", line_tag);
            }
        }
    }

    async fn write_or_fail(&mut self, bytes: &[u8], line: bool) -> Result<()> {
        let write = if line {
            // write_line appends CRLF itself.
            let text = String::from_utf8_lossy(bytes).into_owned();
            self.conn.write_line(&text).await
        } else {
            self.conn.write_raw(bytes).await
        };
        write.map_err(|err| self.fail_session(err))
    }

    /// Fail every in-flight expectation and surface the loss on the
    /// event bus.
    fn fail_session(&mut self, err: Error) -> Error {
        if matches!(err, Error::ConnectionLost | Error::Io(_)) {
            self.events.emit(MailEvent::ConnectionLost);
        }
        self.in_flight = None;
        self.idle_tag = None;
        err
    }

    /// Dispatch an untagged unit no command claimed: update the
    /// selected mailbox and fire the matching event.
    fn handle_unsolicited(&mut self, unit: &ResponseUnit) -> Result<Option<MailEvent>> {
        if let Some(n) = parser::untagged_numeric(unit, "EXISTS") {
            if let Some(mailbox) = &mut self.selected {
                mailbox.messages_exists = n;
            }
            let event = MailEvent::Exists(n);
            self.events.emit(event.clone());
            return Ok(Some(event));
        }
        if let Some(n) = parser::untagged_numeric(unit, "RECENT") {
            if let Some(mailbox) = &mut self.selected {
                mailbox.messages_recent = n;
            }
            let event = MailEvent::Recent(n);
            self.events.emit(event.clone());
            return Ok(Some(event));
        }
        if let Some(n) = parser::untagged_numeric(unit, "EXPUNGE") {
            if let Some(mailbox) = &mut self.selected {
                mailbox.messages_exists = mailbox.messages_exists.saturating_sub(1);
            }
            let event = MailEvent::Expunge(n);
            self.events.emit(event.clone());
            return Ok(Some(event));
        }
        if parser::untagged_numeric(unit, "FETCH").is_some() {
            let message = parser::parse_fetch_unit(unit)?;
            let event = if message.flags.is_empty() {
                MailEvent::Fetch(Box::new(message))
            } else {
                MailEvent::FlagsChanged {
                    sequence_id: message.sequence_id.unwrap_or_default(),
                    flags: message.flags,
                }
            };
            self.events.emit(event.clone());
            return Ok(Some(event));
        }
        if let Some(rest) = unit.head.strip_prefix("* CAPABILITY ") {
            self.server_info
                .set_capabilities(rest.split_whitespace().map(str::to_string).collect());
            return Ok(None);
        }
        if let Some(status) = StatusLine::parse(&unit.head) {
            if status.status == Status::Bye {
                return Err(self.fail_session(Error::Bye(status.message)));
            }
            debug!("S: untagged status: {}", unit.head);
            return Ok(None);
        }
        debug!("S: unhandled untagged unit: {}", unit.head);
        Ok(None)
    }

    // ---- IDLE ----

    /// Enter IDLE: send the command and wait for the server's `+`
    /// continuation. Untagged units arriving before it are dispatched
    /// normally.
    pub async fn idle_start(&mut self) -> Result<()> {
        if self.idle_tag.is_some() {
            return Err(Error::PreconditionFailed("IDLE is already active".into()));
        }
        let tag = self.next_tag();
        debug!("C: {} IDLE", tag);
        let line = format!("{tag} IDLE");
        self.write_or_fail(line.as_bytes(), true).await?;
        loop {
            let unit = match self.conn.read_unit().await {
                Ok(unit) => unit,
                Err(err) => return Err(self.fail_session(err)),
            };
            if unit.head.starts_with('+') {
                self.idle_tag = Some(tag);
                return Ok(());
            }
            if unit.head.starts_with("* ") {
                self.handle_unsolicited(&unit)?;
                continue;
            }
            if let Some(status) = StatusLine::parse(&unit.head) {
                if status.tag.as_deref() == Some(tag.as_str()) {
                    // The server refused IDLE outright.
                    return Err(Error::ServerStatus {
                        code: status.status.to_string(),
                        message: status.message,
                    });
                }
            }
        }
    }

    /// Wait for the next server push while idling. Returns the event
    /// it produced (also delivered on the bus).
    pub async fn idle_wait(&mut self) -> Result<MailEvent> {
        if self.idle_tag.is_none() {
            return Err(Error::PreconditionFailed("IDLE is not active".into()));
        }
        loop {
            let unit = match self.conn.read_unit().await {
                Ok(unit) => unit,
                Err(err) => return Err(self.fail_session(err)),
            };
            if let Some(event) = self.handle_unsolicited(&unit)? {
                return Ok(event);
            }
        }
    }

    /// Leave IDLE: write the bare `DONE` line and consume units until
    /// the tagged completion for the original IDLE command.
    pub async fn idle_done(&mut self) -> Result<Response<()>> {
        let Some(tag) = self.idle_tag.take() else {
            return Err(Error::PreconditionFailed("IDLE is not active".into()));
        };
        debug!("C: DONE");
        self.write_or_fail(b"DONE\r\n", false).await?;
        loop {
            let unit = match self.conn.read_unit().await {
                Ok(unit) => unit,
                Err(err) => return Err(self.fail_session(err)),
            };
            if unit.head.starts_with("* ") {
                self.handle_unsolicited(&unit)?;
                continue;
            }
            if let Some(status) = StatusLine::parse(&unit.head) {
                if status.tag.as_deref() == Some(tag.as_str()) {
                    return Ok(Response {
                        status: status.status,
                        code: status.code,
                        message: if status.message.is_empty() {
                            None
                        } else {
                            Some(status.message)
                        },
                        result: Some(()),
                    });
                }
            }
            warn!("Dropping unexpected line while leaving IDLE: {}", unit.head);
        }
    }

    // ---- transport passthroughs ----

    pub async fn upgrade_tls(&mut self, host: &str, accept_invalid_certs: bool) -> Result<()> {
        self.conn.upgrade_tls(host, accept_invalid_certs).await?;
        self.server_info.is_secure = true;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.conn.close().await
    }
}
