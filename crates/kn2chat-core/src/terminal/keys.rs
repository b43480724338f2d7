//! Byte stream to key decoding.
//!
//! Handles UTF-8 characters, the three line-ending conventions telnet
//! clients use (`CR LF`, `CR NUL`, bare `LF`), and the ANSI/VT escape
//! sequences for arrows, Home, End and Delete.

use crate::KeyInput;

const ESC: u8 = 0x1b;
const CTRL_C: u8 = 0x03;
const BS: u8 = 0x08;
const DEL: u8 = 0x7f;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Ground,
    /// Saw ESC.
    Escape,
    /// Saw `ESC [`, collecting a numeric parameter.
    Csi(u16),
    /// Saw `ESC O`.
    Ss3,
}

/// Incremental key decoder.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    state: State,
    /// Previous byte was CR; swallow a following LF or NUL.
    after_cr: bool,
    /// Partial UTF-8 sequence.
    utf8: Vec<u8>,
}

impl KeyDecoder {
    /// Create a decoder in the ground state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of bytes.
    ///
    /// Sequences may continue in the next chunk. An ESC at the end of a chunk
    /// stays pending until more bytes arrive or [`KeyDecoder::flush`] is
    /// called.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<KeyInput> {
        let mut keys = Vec::new();
        for &b in chunk {
            self.step(b, &mut keys);
        }
        keys
    }

    /// Whether the last byte seen was an ESC that may still start a sequence.
    pub fn has_pending_escape(&self) -> bool {
        self.state == State::Escape
    }

    /// Resolve input that is still ambiguous after the client went quiet.
    ///
    /// A pending ESC becomes [`KeyInput::Esc`]; an unfinished CSI or SS3
    /// sequence is discarded.
    pub fn flush(&mut self) -> Option<KeyInput> {
        let pending = std::mem::take(&mut self.state);
        (pending == State::Escape).then_some(KeyInput::Esc)
    }

    fn step(&mut self, b: u8, keys: &mut Vec<KeyInput>) {
        match self.state {
            State::Ground => self.ground(b, keys),
            State::Escape => match b {
                b'[' => self.state = State::Csi(0),
                b'O' => self.state = State::Ss3,
                _ => {
                    self.state = State::Ground;
                    keys.push(KeyInput::Esc);
                    self.ground(b, keys);
                },
            },
            State::Csi(param) => match b {
                b'0'..=b'9' => {
                    self.state = State::Csi(param.saturating_mul(10).saturating_add(u16::from(b - b'0')));
                },
                // Parameter separators and intermediates; modifiers are ignored.
                b';' | 0x20..=0x2f => {},
                0x40..=0x7e => {
                    self.state = State::Ground;
                    keys.extend(csi_key(param, b));
                },
                // Malformed sequence.
                _ => self.state = State::Ground,
            },
            State::Ss3 => {
                self.state = State::Ground;
                keys.extend(csi_key(0, b));
            },
        }
    }

    fn ground(&mut self, b: u8, keys: &mut Vec<KeyInput>) {
        let after_cr = std::mem::take(&mut self.after_cr);
        if b < 0x20 || b == DEL {
            self.utf8.clear();
        }

        match b {
            b'\r' => {
                self.after_cr = true;
                keys.push(KeyInput::Enter);
            },
            b'\n' | 0 if after_cr => {},
            b'\n' => keys.push(KeyInput::Enter),
            ESC => self.state = State::Escape,
            CTRL_C => keys.push(KeyInput::CtrlC),
            BS | DEL => keys.push(KeyInput::Backspace),
            0x00..=0x1f => {},
            _ => self.utf8_byte(b, keys),
        }
    }

    fn utf8_byte(&mut self, b: u8, keys: &mut Vec<KeyInput>) {
        let had_prefix = !self.utf8.is_empty();
        self.utf8.push(b);
        match std::str::from_utf8(&self.utf8) {
            Ok(s) => {
                keys.extend(s.chars().map(KeyInput::Char));
                self.utf8.clear();
            },
            // Incomplete sequence, wait for more bytes.
            Err(e) if e.error_len().is_none() => {},
            Err(_) => {
                self.utf8.clear();
                // The byte that broke the sequence may start a valid one.
                if had_prefix {
                    self.utf8_byte(b, keys);
                }
            },
        }
    }
}

fn csi_key(param: u16, final_byte: u8) -> Option<KeyInput> {
    match (param, final_byte) {
        (_, b'C') => Some(KeyInput::Right),
        (_, b'D') => Some(KeyInput::Left),
        (_, b'H') | (1 | 7, b'~') => Some(KeyInput::Home),
        (_, b'F') | (4 | 8, b'~') => Some(KeyInput::End),
        (3, b'~') => Some(KeyInput::Delete),
        _ => None,
    }
}
