//! One admitted client's live handle.
//!
//! A [`Session`] owns the sending half of a bounded mailbox; the connection
//! task owns the receiving half ([`Mailbox`]). Delivery is a non-blocking
//! hand-off, so a client that stops reading fills its own mailbox and nothing
//! else.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use kn2chat_core::Message;
use thiserror::Error;
use tokio::sync::mpsc;

/// Outcome of a successful [`Session::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message queued in the mailbox.
    Queued,
    /// Session already closed; the message was discarded.
    Dropped,
}

/// The session's sink is broken and the session should be evicted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// Mailbox is at capacity; the client is not keeping up.
    #[error("mailbox full")]
    Full,
    /// Connection task dropped its mailbox.
    #[error("mailbox disconnected")]
    Disconnected,
}

/// A connected, admitted client.
#[derive(Debug)]
pub struct Session {
    id: u64,
    identity: String,
    authenticated: bool,
    /// `None` once closed.
    sink: Mutex<Option<mpsc::Sender<Message>>>,
    open: AtomicBool,
}

/// Receiving half of a session's mailbox.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Message>,
}

impl Session {
    /// Create a session with a mailbox holding at most `capacity` messages.
    pub fn new(
        id: u64,
        identity: impl Into<String>,
        authenticated: bool,
        capacity: usize,
    ) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Self {
            id,
            identity: identity.into(),
            authenticated,
            sink: Mutex::new(Some(tx)),
            open: AtomicBool::new(true),
        };
        (session, Mailbox { rx })
    }

    /// Hand `message` to the mailbox without waiting.
    pub fn deliver(&self, message: &Message) -> Result<Delivery, SinkError> {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sink.as_ref() else {
            return Ok(Delivery::Dropped);
        };

        match tx.try_send(message.clone()) {
            Ok(()) => Ok(Delivery::Queued),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SinkError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Disconnected),
        }
    }

    /// Close the session. Later deliveries are dropped.
    ///
    /// Queued messages stay readable; the mailbox reports closed once they
    /// are drained. Returns `true` if this call closed it.
    pub fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
        was_open
    }

    /// Whether [`Session::close`] has not been called yet.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Registry key.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether the client proved a key listed for its identity.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

impl Mailbox {
    /// Next message. `None` once the session is closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Next message if one is queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}
