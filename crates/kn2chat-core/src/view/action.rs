//! Chat view side-effects.

/// Actions produced by the chat view for the connection task to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Redraw the screen.
    Render,

    /// Broadcast a message with this text.
    Send(String),

    /// Close the connection.
    Quit,
}
