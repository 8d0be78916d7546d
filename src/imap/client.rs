//! IMAP client facade
//!
//! [`ImapClient`] composes the connection, framer, scheduler and
//! parsers into typed operations. Every operation submits one command
//! through the session's single in-flight slot and returns a typed
//! [`Response`].

use crate::config::{MailConfig, Security};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::events::{EventBus, MailEvent};
use crate::framer::FramerMode;
use crate::imap::command::{Command, quote_astring};
use crate::imap::flag::Flag;
use crate::imap::mailbox::Mailbox;
use crate::imap::parser::{
    CapabilityParser, EnabledParser, FetchParser, GenericParser, ListParser, LogoutParser,
    MetaDataParser, NoopParser, SearchParser, SelectParser, StatusParser,
};
use crate::imap::session::ImapSession;
use crate::imap::types::{
    GenericImapResult, MetaDataDepth, MetaDataEntry, Response, ServerInfo, StatusItem,
    StoreAction,
};
use crate::mime::MimeMessage;
use tokio::sync::broadcast;
use tracing::info;

/// Longest metadata value that is still sent inline-quoted; larger or
/// quote-unsafe values go as literals via the continuation protocol.
const METADATA_INLINE_MAX: usize = 80;

/// Async IMAP4rev1 client with IDLE, METADATA, UIDPLUS, MOVE,
/// CONDSTORE and ENABLE support.
pub struct ImapClient {
    session: ImapSession,
    config: MailConfig,
}

impl ImapClient {
    /// Connect to the configured server and read its greeting. With
    /// [`Security::StartTls`] the connection is upgraded before this
    /// returns.
    pub async fn connect(config: MailConfig) -> Result<Self> {
        Self::connect_with_events(config, EventBus::new()).await
    }

    /// Connect using a caller-supplied event bus (for sharing one bus
    /// across clients).
    pub async fn connect_with_events(config: MailConfig, events: EventBus) -> Result<Self> {
        let conn = Connection::open(&config, FramerMode::Imap).await?;
        let server_info = ServerInfo {
            host: config.host.clone(),
            port: config.port,
            is_secure: conn.is_secure(),
            ..ServerInfo::default()
        };
        let mut session = ImapSession::new(conn, events, server_info);
        session.read_greeting().await?;
        let mut client = Self { session, config };
        if client.config.security == Security::StartTls {
            client.start_tls().await?.into_result()?;
        }
        info!(
            "Connected to IMAP server {}:{}",
            client.config.host, client.config.port
        );
        Ok(client)
    }

    /// Subscribe to unsolicited server events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MailEvent> {
        self.session.events.subscribe()
    }

    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.session.server_info
    }

    /// The mailbox currently open on this session, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&Mailbox> {
        self.session.selected.as_ref()
    }

    fn require_selected(&self) -> Result<&Mailbox> {
        self.session
            .selected
            .as_ref()
            .ok_or_else(|| Error::PreconditionFailed("no mailbox selected".into()))
    }

    // ---- session lifecycle ----

    /// Authenticate with LOGIN. The password never reaches the logs.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Response<Vec<String>>> {
        let command = Command::redacted(format!(
            "LOGIN {} {}",
            quote_astring(username),
            quote_astring(password)
        ));
        let response = self
            .session
            .execute(command, CapabilityParser::default())
            .await?;
        if response.is_ok() {
            if let Some(caps) = &response.result {
                if !caps.is_empty() {
                    self.session.server_info.set_capabilities(caps.clone());
                }
            }
            info!("Logged in as {}", username);
        }
        Ok(response)
    }

    /// Log out; returns the server's BYE text.
    pub async fn logout(&mut self) -> Result<Response<String>> {
        let response = self
            .session
            .execute(Command::new("LOGOUT"), LogoutParser::default())
            .await?;
        self.session.selected = None;
        self.session.close().await.ok();
        Ok(response)
    }

    /// Upgrade the connection with STARTTLS. All capability state
    /// learned on the plaintext connection is invalidated and
    /// re-fetched after the handshake.
    pub async fn start_tls(&mut self) -> Result<Response<GenericImapResult>> {
        let response = self
            .session
            .execute(Command::new("STARTTLS"), GenericParser)
            .await?;
        if response.is_ok() {
            let host = self.config.host.clone();
            self.session
                .upgrade_tls(&host, self.config.accept_invalid_certs)
                .await?;
            self.session.server_info.clear_capabilities();
            self.capability().await?;
        }
        Ok(response)
    }

    /// Explicit CAPABILITY round-trip; updates [`ServerInfo`].
    pub async fn capability(&mut self) -> Result<Response<Vec<String>>> {
        let response = self
            .session
            .execute(Command::new("CAPABILITY"), CapabilityParser::default())
            .await?;
        if response.is_ok() {
            if let Some(caps) = &response.result {
                self.session.server_info.set_capabilities(caps.clone());
            }
        }
        Ok(response)
    }

    /// ENABLE (RFC 5161); returns the capabilities the server
    /// actually enabled.
    pub async fn enable(&mut self, capabilities: &[&str]) -> Result<Response<Vec<String>>> {
        if !self.session.server_info.has_capability("ENABLE") {
            return Err(Error::PreconditionFailed(
                "server does not advertise ENABLE".into(),
            ));
        }
        let command = Command::new(format!("ENABLE {}", capabilities.join(" ")));
        self.session
            .execute(command, EnabledParser::default())
            .await
    }

    /// NOOP; any state the server pushes lands in the selected
    /// mailbox and on the event bus.
    pub async fn noop(&mut self) -> Result<Response<Mailbox>> {
        let response = self.session.execute(Command::new("NOOP"), NoopParser).await?;
        let mailbox = self.session.selected.clone();
        Ok(response.with_result(mailbox))
    }

    /// Close the connection without LOGOUT.
    pub async fn close(mut self) -> Result<()> {
        self.session.close().await
    }

    // ---- mailbox listing and selection ----

    /// LIST mailboxes under `reference`. With `recursive` the whole
    /// subtree is returned, otherwise one level.
    pub async fn list_mailboxes(
        &mut self,
        reference: &str,
        recursive: bool,
    ) -> Result<Response<Vec<Mailbox>>> {
        self.list_internal(reference, recursive, false).await
    }

    /// LSUB: like [`Self::list_mailboxes`] but restricted to
    /// subscribed mailboxes.
    pub async fn list_subscribed_mailboxes(
        &mut self,
        reference: &str,
        recursive: bool,
    ) -> Result<Response<Vec<Mailbox>>> {
        self.list_internal(reference, recursive, true).await
    }

    async fn list_internal(
        &mut self,
        reference: &str,
        recursive: bool,
        is_lsub: bool,
    ) -> Result<Response<Vec<Mailbox>>> {
        let verb = if is_lsub { "LSUB" } else { "LIST" };
        let pattern = if recursive { "*" } else { "%" };
        let command = Command::new(format!(
            "{verb} {} {}",
            quote_astring(reference),
            quote_astring(pattern)
        ));
        let response = self.session.execute(command, ListParser::new(is_lsub)).await?;
        self.learn_separator(&response);
        Ok(response)
    }

    fn learn_separator(&mut self, response: &Response<Vec<Mailbox>>) {
        if let Some(separator) = response
            .result
            .as_ref()
            .and_then(|boxes| boxes.iter().find_map(|mb| mb.separator))
        {
            self.session.server_info.path_separator = Some(separator);
        }
    }

    /// The hierarchy separator, learned via `LIST "" ""` when not yet
    /// known.
    pub async fn path_separator(&mut self) -> Result<Option<char>> {
        if self.session.server_info.path_separator.is_none() {
            let command = Command::new("LIST \"\" \"\"");
            let response = self.session.execute(command, ListParser::new(false)).await?;
            self.learn_separator(&response);
        }
        Ok(self.session.server_info.path_separator)
    }

    /// SELECT a mailbox read-write.
    pub async fn select_mailbox(&mut self, mailbox: &Mailbox) -> Result<Response<Mailbox>> {
        self.select_internal(mailbox.clone(), false).await
    }

    /// SELECT by server path, learning the hierarchy separator first
    /// when necessary.
    pub async fn select_mailbox_by_path(&mut self, path: &str) -> Result<Response<Mailbox>> {
        let separator = self.path_separator().await?;
        self.select_internal(Mailbox::new(path, separator), false).await
    }

    /// SELECT the INBOX every server is required to have.
    pub async fn select_inbox(&mut self) -> Result<Response<Mailbox>> {
        self.select_mailbox_by_path("INBOX").await
    }

    /// EXAMINE: read-only selection.
    pub async fn examine_mailbox(&mut self, mailbox: &Mailbox) -> Result<Response<Mailbox>> {
        self.select_internal(mailbox.clone(), true).await
    }

    async fn select_internal(
        &mut self,
        mailbox: Mailbox,
        examine: bool,
    ) -> Result<Response<Mailbox>> {
        let verb = if examine { "EXAMINE" } else { "SELECT" };
        let command = Command::new(format!("{verb} {}", quote_astring(&mailbox.path)));
        let response = self
            .session
            .execute(command, SelectParser::new(mailbox, examine))
            .await?;
        if response.is_ok() {
            self.session.selected.clone_from(&response.result);
        }
        Ok(response)
    }

    /// CLOSE the selected mailbox (expunging deleted messages).
    pub async fn close_mailbox(&mut self) -> Result<Response<()>> {
        self.require_selected()?;
        let response = self.session.execute(Command::new("CLOSE"), NoopParser).await?;
        if response.is_ok() {
            self.session.selected = None;
        }
        Ok(response)
    }

    /// STATUS: fetch counts without changing the selection.
    pub async fn status_mailbox(
        &mut self,
        mailbox: &Mailbox,
        items: &[StatusItem],
    ) -> Result<Response<Mailbox>> {
        let names: Vec<&str> = items.iter().map(|item| item.as_imap_str()).collect();
        let command = Command::new(format!(
            "STATUS {} ({})",
            quote_astring(&mailbox.path),
            names.join(" ")
        ));
        self.session
            .execute(command, StatusParser::new(mailbox.clone()))
            .await
    }

    // ---- mailbox management ----

    /// CREATE a mailbox and return its handle.
    pub async fn create_mailbox(&mut self, path: &str) -> Result<Response<Mailbox>> {
        let command = Command::new(format!("CREATE {}", quote_astring(path)));
        let response = self.session.execute(command, NoopParser).await?;
        let separator = self.session.server_info.path_separator;
        Ok(response.with_result(Some(Mailbox::new(path, separator))))
    }

    /// DELETE a mailbox.
    pub async fn delete_mailbox(&mut self, mailbox: &Mailbox) -> Result<Response<()>> {
        let command = Command::new(format!("DELETE {}", quote_astring(&mailbox.path)));
        self.session.execute(command, NoopParser).await
    }

    /// RENAME a mailbox. Renaming INBOX moves its contents into the
    /// new name and leaves INBOX empty (RFC 3501 §6.3.5).
    pub async fn rename_mailbox(
        &mut self,
        mailbox: &Mailbox,
        new_path: &str,
    ) -> Result<Response<Mailbox>> {
        let command = Command::new(format!(
            "RENAME {} {}",
            quote_astring(&mailbox.path),
            quote_astring(new_path)
        ));
        let response = self.session.execute(command, NoopParser).await?;
        let separator = self.session.server_info.path_separator;
        Ok(response.with_result(Some(Mailbox::new(new_path, separator))))
    }

    /// SUBSCRIBE to a mailbox.
    pub async fn subscribe_mailbox(&mut self, mailbox: &Mailbox) -> Result<Response<()>> {
        let command = Command::new(format!("SUBSCRIBE {}", quote_astring(&mailbox.path)));
        self.session.execute(command, NoopParser).await
    }

    /// UNSUBSCRIBE from a mailbox.
    pub async fn unsubscribe_mailbox(&mut self, mailbox: &Mailbox) -> Result<Response<()>> {
        let command = Command::new(format!("UNSUBSCRIBE {}", quote_astring(&mailbox.path)));
        self.session.execute(command, NoopParser).await
    }

    // ---- search and fetch ----

    /// SEARCH with raw criteria, returning sequence ids in server
    /// order.
    pub async fn search_messages(&mut self, criteria: &str) -> Result<Response<Vec<u32>>> {
        self.require_selected()?;
        let command = Command::new(format!("SEARCH {criteria}"));
        self.session.execute(command, SearchParser::default()).await
    }

    /// SEARCH for unseen messages (the common default).
    pub async fn search_unseen(&mut self) -> Result<Response<Vec<u32>>> {
        self.search_messages("UNSEEN").await
    }

    /// UID SEARCH with raw criteria.
    pub async fn uid_search_messages(&mut self, criteria: &str) -> Result<Response<Vec<u32>>> {
        self.require_selected()?;
        let command = Command::new(format!("UID SEARCH {criteria}"));
        self.session.execute(command, SearchParser::default()).await
    }

    /// FETCH one message by sequence id.
    pub async fn fetch_message(
        &mut self,
        sequence_id: u32,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.fetch_messages(&sequence_id.to_string(), items).await
    }

    /// FETCH a sequence set (e.g. `1`, `2:4`, `1,3,5`).
    pub async fn fetch_messages(
        &mut self,
        sequence_set: &str,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.require_selected()?;
        let command = Command::new(format!("FETCH {sequence_set} {items}"));
        self.session.execute(command, FetchParser::default()).await
    }

    /// FETCH with a raw criteria string (sequence set and items in
    /// one, for callers that build their own).
    pub async fn fetch_messages_by_criteria(
        &mut self,
        criteria: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.require_selected()?;
        let command = Command::new(format!("FETCH {criteria}"));
        self.session.execute(command, FetchParser::default()).await
    }

    /// UID FETCH a UID set.
    pub async fn uid_fetch_messages(
        &mut self,
        uid_set: &str,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.require_selected()?;
        let command = Command::new(format!("UID FETCH {uid_set} {items}"));
        self.session.execute(command, FetchParser::default()).await
    }

    /// FETCH the `count` highest-numbered messages in the selected
    /// mailbox.
    pub async fn fetch_recent_messages(
        &mut self,
        count: u32,
        items: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        let exists = self.require_selected()?.messages_exists;
        if exists == 0 || count == 0 {
            return Ok(Response {
                status: crate::imap::types::Status::Ok,
                code: None,
                message: None,
                result: Some(Vec::new()),
            });
        }
        let start = exists.saturating_sub(count - 1).max(1);
        self.fetch_messages(&format!("{start}:{exists}"), items).await
    }

    // ---- copy, move, store ----

    /// COPY a sequence set into another mailbox. With UIDPLUS the
    /// result carries the `COPYUID` hint.
    pub async fn copy(
        &mut self,
        sequence_set: &str,
        target: &Mailbox,
    ) -> Result<Response<GenericImapResult>> {
        self.require_selected()?;
        let command = Command::new(format!(
            "COPY {sequence_set} {}",
            quote_astring(&target.path)
        ));
        self.session.execute(command, GenericParser).await
    }

    /// UID COPY a UID set into another mailbox.
    pub async fn uid_copy(
        &mut self,
        uid_set: &str,
        target: &Mailbox,
    ) -> Result<Response<GenericImapResult>> {
        self.require_selected()?;
        let command = Command::new(format!(
            "UID COPY {uid_set} {}",
            quote_astring(&target.path)
        ));
        self.session.execute(command, GenericParser).await
    }

    /// MOVE a sequence set. Servers without the MOVE capability get
    /// the COPY + STORE `\Deleted` + EXPUNGE fallback.
    pub async fn move_messages(
        &mut self,
        sequence_set: &str,
        target: &Mailbox,
    ) -> Result<Response<GenericImapResult>> {
        self.require_selected()?;
        if self.session.server_info.has_capability("MOVE") {
            let command = Command::new(format!(
                "MOVE {sequence_set} {}",
                quote_astring(&target.path)
            ));
            return self.session.execute(command, GenericParser).await;
        }
        let copied = self.copy(sequence_set, target).await?;
        if !copied.is_ok() {
            return Ok(copied);
        }
        self.store(sequence_set, &[Flag::Deleted], StoreAction::Add, true)
            .await?;
        self.expunge().await?;
        Ok(copied)
    }

    /// STORE flags on a sequence set. Unless `silent`, the server
    /// echoes the updated messages back.
    pub async fn store(
        &mut self,
        sequence_set: &str,
        flags: &[Flag],
        action: StoreAction,
        silent: bool,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.require_selected()?;
        let flag_list: Vec<&str> = flags.iter().map(Flag::as_imap_str).collect();
        let suffix = if silent { ".SILENT" } else { "" };
        let command = Command::new(format!(
            "STORE {sequence_set} {}{suffix} ({})",
            action.as_imap_str(),
            flag_list.join(" ")
        ));
        self.session.execute(command, FetchParser::default()).await
    }

    /// UID STORE flags on a UID set.
    pub async fn uid_store(
        &mut self,
        uid_set: &str,
        flags: &[Flag],
        action: StoreAction,
        silent: bool,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.require_selected()?;
        let flag_list: Vec<&str> = flags.iter().map(Flag::as_imap_str).collect();
        let suffix = if silent { ".SILENT" } else { "" };
        let command = Command::new(format!(
            "UID STORE {uid_set} {}{suffix} ({})",
            action.as_imap_str(),
            flag_list.join(" ")
        ));
        self.session.execute(command, FetchParser::default()).await
    }

    pub async fn mark_seen(&mut self, sequence_set: &str) -> Result<Response<Vec<MimeMessage>>> {
        self.store(sequence_set, &[Flag::Seen], StoreAction::Add, false).await
    }

    pub async fn mark_unseen(&mut self, sequence_set: &str) -> Result<Response<Vec<MimeMessage>>> {
        self.store(sequence_set, &[Flag::Seen], StoreAction::Remove, false).await
    }

    pub async fn mark_flagged(&mut self, sequence_set: &str) -> Result<Response<Vec<MimeMessage>>> {
        self.store(sequence_set, &[Flag::Flagged], StoreAction::Add, false).await
    }

    pub async fn mark_unflagged(
        &mut self,
        sequence_set: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.store(sequence_set, &[Flag::Flagged], StoreAction::Remove, false).await
    }

    pub async fn mark_deleted(&mut self, sequence_set: &str) -> Result<Response<Vec<MimeMessage>>> {
        self.store(sequence_set, &[Flag::Deleted], StoreAction::Add, false).await
    }

    pub async fn mark_undeleted(
        &mut self,
        sequence_set: &str,
    ) -> Result<Response<Vec<MimeMessage>>> {
        self.store(sequence_set, &[Flag::Deleted], StoreAction::Remove, false).await
    }

    /// EXPUNGE deleted messages; removals arrive as `Expunge` events.
    pub async fn expunge(&mut self) -> Result<Response<()>> {
        self.require_selected()?;
        self.session.execute(Command::new("EXPUNGE"), NoopParser).await
    }

    /// APPEND a raw message; with UIDPLUS the result carries the
    /// `APPENDUID` hint.
    pub async fn append_message(
        &mut self,
        mailbox: &Mailbox,
        flags: &[Flag],
        message: &[u8],
    ) -> Result<Response<GenericImapResult>> {
        let flag_list: Vec<&str> = flags.iter().map(Flag::as_imap_str).collect();
        let command = Command::new(format!(
            "APPEND {} ({}) {{{}}}",
            quote_astring(&mailbox.path),
            flag_list.join(" "),
            message.len()
        ))
        .with_continuation(message.to_vec());
        self.session.execute(command, GenericParser).await
    }

    // ---- METADATA (RFC 5464) ----

    /// GETMETADATA for the given entries. An empty `mailbox` path
    /// addresses server-global annotations.
    pub async fn get_metadata(
        &mut self,
        mailbox: &str,
        entries: &[&str],
        max_size: Option<u32>,
        depth: MetaDataDepth,
    ) -> Result<Response<Vec<MetaDataEntry>>> {
        let mut options = Vec::new();
        if let Some(size) = max_size {
            options.push(format!("MAXSIZE {size}"));
        }
        if depth != MetaDataDepth::None {
            options.push(format!("DEPTH {}", depth.as_imap_str()));
        }
        let options = if options.is_empty() {
            String::new()
        } else {
            format!("({}) ", options.join(" "))
        };
        let command = Command::new(format!(
            "GETMETADATA {options}{} ({})",
            quote_astring(mailbox),
            entries.join(" ")
        ));
        self.session
            .execute(command, MetaDataParser::default())
            .await
    }

    /// SETMETADATA for one entry.
    pub async fn set_metadata(&mut self, entry: &MetaDataEntry) -> Result<Response<()>> {
        self.set_metadata_entries(std::slice::from_ref(entry)).await
    }

    /// SETMETADATA for several entries of one mailbox. Values that
    /// are short and quote-safe travel inline; everything else is
    /// sent as a literal through the continuation protocol.
    pub async fn set_metadata_entries(
        &mut self,
        entries: &[MetaDataEntry],
    ) -> Result<Response<()>> {
        let Some(first) = entries.first() else {
            return Err(Error::PreconditionFailed(
                "no metadata entries given".into(),
            ));
        };
        let mut parts: Vec<Vec<u8>> = Vec::new();
        let mut current = format!(
            "SETMETADATA {} (",
            quote_astring(&first.mailbox_name)
        )
        .into_bytes();
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                current.push(b' ');
            }
            current.extend_from_slice(entry.entry.as_bytes());
            current.push(b' ');
            match &entry.value {
                None => current.extend_from_slice(b"NIL"),
                Some(value) if is_inline_metadata_value(value) => {
                    current.push(b'"');
                    current.extend_from_slice(value);
                    current.push(b'"');
                }
                Some(value) => {
                    current.extend_from_slice(format!("{{{}}}", value.len()).as_bytes());
                    parts.push(std::mem::take(&mut current));
                    current.extend_from_slice(value);
                }
            }
        }
        current.push(b')');
        parts.push(current);

        let mut parts = parts.into_iter();
        let text = String::from_utf8_lossy(&parts.next().unwrap_or_default()).into_owned();
        let mut command = Command::new(text);
        for part in parts {
            command = command.with_continuation(part);
        }
        self.session.execute(command, NoopParser).await
    }

    // ---- IDLE ----

    /// Enter IDLE. Requires a selected mailbox; server pushes arrive
    /// on the event bus until [`Self::idle_done`].
    pub async fn idle_start(&mut self) -> Result<()> {
        self.require_selected()?;
        self.session.idle_start().await
    }

    /// Block until the server pushes the next event while idling.
    pub async fn idle_wait(&mut self) -> Result<MailEvent> {
        self.session.idle_wait().await
    }

    /// Leave IDLE by sending `DONE`; completes the original IDLE
    /// command.
    pub async fn idle_done(&mut self) -> Result<Response<()>> {
        self.session.idle_done().await
    }
}

/// Inline rule for SETMETADATA values: short, single-line and free of
/// quote characters.
fn is_inline_metadata_value(value: &[u8]) -> bool {
    value.len() < METADATA_INLINE_MAX
        && !value
            .iter()
            .any(|&b| b == b'"' || b == b'\\' || b == b'\r' || b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_metadata_rule() {
        assert!(is_inline_metadata_value(b"short comment"));
        assert!(!is_inline_metadata_value(b"has \"quotes\""));
        assert!(!is_inline_metadata_value(b"line\r\nbreak"));
        assert!(!is_inline_metadata_value(&[b'x'; 200]));
    }
}
