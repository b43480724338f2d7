//! Chat view input events.
//!
//! [`ChatEvent`] is the closed set of inputs that drive a
//! [`crate::ChatView`]. Terminal input (keys, window size) and messages
//! delivered by the broadcaster arrive through the same enum so a connection
//! task has exactly one place to feed.

use crate::{KeyInput, Message};

/// Events processed by the chat view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Terminal resize (columns, rows).
    Resize(u16, u16),

    /// Keyboard input.
    Key(KeyInput),

    /// Message delivered by the broadcaster.
    Incoming(Message),

    /// Error to surface in the view.
    Error(String),
}
