//! Fuzz target for the ChatView state machine
//!
//! # Invariants
//!
//! - Cursor never leaves the input buffer
//! - Input never exceeds the message limit
//! - Every `Send` carries a valid, non-empty message
//! - Only Esc and Ctrl-C quit

#![no_main]

use arbitrary::Arbitrary;
use kn2chat_core::{ChatAction, ChatEvent, ChatView, KeyInput, MAX_MESSAGE_CHARS, Message};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum ViewOp {
    Resize(u16, u16),
    Char(char),
    Enter,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Quit { ctrl_c: bool },
    Incoming { sender: String, text: String },
    Error(String),
}

fuzz_target!(|ops: Vec<ViewOp>| {
    let mut view = ChatView::new("fuzz");

    for op in ops {
        let quitting = matches!(op, ViewOp::Quit { .. });
        let event = match op {
            ViewOp::Resize(cols, rows) => ChatEvent::Resize(cols, rows),
            ViewOp::Char(c) => ChatEvent::Key(KeyInput::Char(c)),
            ViewOp::Enter => ChatEvent::Key(KeyInput::Enter),
            ViewOp::Backspace => ChatEvent::Key(KeyInput::Backspace),
            ViewOp::Delete => ChatEvent::Key(KeyInput::Delete),
            ViewOp::Left => ChatEvent::Key(KeyInput::Left),
            ViewOp::Right => ChatEvent::Key(KeyInput::Right),
            ViewOp::Home => ChatEvent::Key(KeyInput::Home),
            ViewOp::End => ChatEvent::Key(KeyInput::End),
            ViewOp::Quit { ctrl_c: true } => ChatEvent::Key(KeyInput::CtrlC),
            ViewOp::Quit { ctrl_c: false } => ChatEvent::Key(KeyInput::Esc),
            ViewOp::Incoming { sender, text } => match Message::new(sender.as_str(), 0, &text) {
                Ok(message) => ChatEvent::Incoming(message),
                Err(_) => continue,
            },
            ViewOp::Error(text) => ChatEvent::Error(text),
        };

        for action in view.handle(event) {
            match action {
                ChatAction::Quit => assert!(quitting, "quit without Esc or Ctrl-C"),
                ChatAction::Send(text) => {
                    assert!(Message::new("fuzz", 0, &text).is_ok(), "sent invalid text {text:?}");
                },
                ChatAction::Render => {},
            }
        }

        let len = view.input().chars().count();
        assert!(len <= MAX_MESSAGE_CHARS);
        assert!(view.cursor() <= len);
    }
});
