//! Per-connection chat view state machine.
//!
//! Pure state machine: consumes [`ChatEvent`]s and produces [`ChatAction`]s
//! for the connection task to execute. It owns everything a screen needs
//! (input line, transcript, terminal size) and nothing about how the screen
//! is drawn.

mod action;
mod event;
mod input;

use std::collections::VecDeque;

pub use action::ChatAction;
pub use event::ChatEvent;
pub use input::KeyInput;

use crate::message::{MAX_MESSAGE_CHARS, Message};

/// Messages kept for scrollback. Older ones are discarded.
pub const SCROLLBACK: usize = 500;

/// Chat view for one connected client.
#[derive(Debug, Clone)]
pub struct ChatView {
    /// Display identity of the local user.
    identity: String,
    /// Input line, one entry per character.
    input: Vec<char>,
    /// Cursor position in characters.
    cursor: usize,
    /// Received messages, oldest first.
    transcript: VecDeque<Message>,
    /// Terminal dimensions (columns, rows).
    size: (u16, u16),
    /// Set once the terminal reported its size.
    ready: bool,
    /// Most recent error. `None` if nothing went wrong.
    error: Option<String>,
}

impl ChatView {
    /// Create a view for `identity` with an 80x24 terminal.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            input: Vec::new(),
            cursor: 0,
            transcript: VecDeque::new(),
            size: (80, 24),
            ready: false,
            error: None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: ChatEvent) -> Vec<ChatAction> {
        match event {
            ChatEvent::Resize(cols, rows) => {
                self.size = (cols, rows);
                self.ready = true;
                vec![ChatAction::Render]
            },
            ChatEvent::Key(key) => self.handle_key(key),
            ChatEvent::Incoming(message) => {
                if self.transcript.len() == SCROLLBACK {
                    self.transcript.pop_front();
                }
                self.transcript.push_back(message);
                vec![ChatAction::Render]
            },
            ChatEvent::Error(message) => {
                self.error = Some(message);
                vec![ChatAction::Render]
            },
        }
    }

    fn handle_key(&mut self, key: KeyInput) -> Vec<ChatAction> {
        match key {
            KeyInput::Char(c) => {
                if c.is_control() || self.input.len() >= MAX_MESSAGE_CHARS {
                    return vec![];
                }
                self.input.insert(self.cursor, c);
                self.cursor += 1;
                vec![ChatAction::Render]
            },
            KeyInput::Backspace => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.input.remove(self.cursor);
                }
                vec![ChatAction::Render]
            },
            KeyInput::Delete => {
                if self.cursor < self.input.len() {
                    self.input.remove(self.cursor);
                }
                vec![ChatAction::Render]
            },
            KeyInput::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                vec![ChatAction::Render]
            },
            KeyInput::Right => {
                self.cursor = (self.cursor + 1).min(self.input.len());
                vec![ChatAction::Render]
            },
            KeyInput::Home => {
                self.cursor = 0;
                vec![ChatAction::Render]
            },
            KeyInput::End => {
                self.cursor = self.input.len();
                vec![ChatAction::Render]
            },
            KeyInput::Enter => self.handle_enter(),
            KeyInput::Esc | KeyInput::CtrlC => vec![ChatAction::Quit],
        }
    }

    /// Take the input line and send it. Blank lines are discarded.
    fn handle_enter(&mut self) -> Vec<ChatAction> {
        let text: String = std::mem::take(&mut self.input).into_iter().collect();
        self.cursor = 0;
        self.error = None;

        let text = text.trim();
        if text.is_empty() {
            return vec![ChatAction::Render];
        }

        vec![ChatAction::Send(text.to_string()), ChatAction::Render]
    }

    /// Display identity of the local user.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current input line.
    pub fn input(&self) -> String {
        self.input.iter().collect()
    }

    /// Cursor position in characters.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Received messages, oldest first.
    pub fn transcript(&self) -> impl ExactSizeIterator<Item = &Message> + DoubleEndedIterator {
        self.transcript.iter()
    }

    /// Terminal dimensions (columns, rows).
    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    /// Whether the terminal has reported its size.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Most recent error. `None` if nothing went wrong since the last send.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
