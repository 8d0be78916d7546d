//! Asynchronous server event delivery
//!
//! Untagged responses that arrive outside any command's interest
//! (mailbox count changes, expunges, flag updates pushed during IDLE)
//! are delivered through a per-client [`EventBus`]. Subscribers
//! receive events in subscription order; a lagging subscriber drops
//! its oldest events rather than blocking the session.

use crate::imap::Flag;
use crate::mime::MimeMessage;
use tokio::sync::broadcast;

/// An unsolicited server event.
#[derive(Debug, Clone)]
pub enum MailEvent {
    /// The transport failed or reached EOF.
    ConnectionLost,
    /// `* <n> EXPUNGE` — the message with this sequence id was removed.
    Expunge(u32),
    /// `* <n> EXISTS` — the selected mailbox now holds n messages.
    Exists(u32),
    /// `* <n> RECENT`.
    Recent(u32),
    /// A FETCH pushed outside a FETCH command (typically during IDLE).
    Fetch(Box<MimeMessage>),
    /// Flags of a message changed.
    FlagsChanged { sequence_id: u32, flags: Vec<Flag> },
}

/// Broadcast channel for [`MailEvent`]s, scoped to one client unless
/// the caller shares it explicitly at construction.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MailEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a bus that buffers up to `capacity` undelivered events
    /// per subscriber before dropping the oldest.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MailEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to all current subscribers. Never blocks; a
    /// bus without subscribers discards the event.
    pub(crate) fn emit(&self, event: MailEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
