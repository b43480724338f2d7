//! Chat message value.
//!
//! A [`Message`] is created exactly once per send action and never mutated.
//! Fields are reference counted so fan-out hands every session a cheap
//! shared copy instead of duplicating the text.

use std::sync::Arc;

use crate::error::MessageError;

/// Maximum message length in characters (not bytes).
pub const MAX_MESSAGE_CHARS: usize = 280;

/// Sender name used for server notices.
pub const SYSTEM_SENDER: &str = "*";

/// An immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: Arc<str>,
    timestamp: u64,
    text: Arc<str>,
}

impl Message {
    /// Build a message from user input.
    ///
    /// Surrounding whitespace is stripped. Fails if nothing is left or the
    /// text exceeds [`MAX_MESSAGE_CHARS`].
    pub fn new(
        sender: impl Into<Arc<str>>,
        timestamp: u64,
        text: &str,
    ) -> Result<Self, MessageError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MessageError::Empty);
        }

        let len = text.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(MessageError::TooLong { len });
        }

        Ok(Self { sender: sender.into(), timestamp, text: text.into() })
    }

    /// Build a server notice from [`SYSTEM_SENDER`].
    pub fn system(timestamp: u64, text: &str) -> Result<Self, MessageError> {
        Self::new(SYSTEM_SENDER, timestamp, text)
    }

    /// Display identity of the sender.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Seconds since the Unix epoch when the message was created.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Message body.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this is a server notice.
    pub fn is_system(&self) -> bool {
        &*self.sender == SYSTEM_SENDER
    }
}
