//! Telnet IAC parsing.
//!
//! Intentionally minimal. The server offers to echo and suppress go-ahead
//! (putting clients into character mode) and asks for NAWS window-size
//! reports. Replies that acknowledge those offers are swallowed; any other
//! option is refused:
//! - `IAC DO <opt>`   => `IAC WONT <opt>`
//! - `IAC WILL <opt>` => `IAC DONT <opt>`
//!
//! Subnegotiation blocks (`IAC SB ... IAC SE`) are stripped; NAWS payloads
//! become resize reports.

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;
const OPT_NAWS: u8 = 31;

/// Longest subnegotiation payload kept. Anything beyond is dropped.
const MAX_SUBNEG: usize = 64;

/// Negotiation the server sends right after admission.
pub fn server_negotiation() -> [u8; 9] {
    [IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA, IAC, DO, OPT_NAWS]
}

/// Result of decoding one chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TelnetOutput {
    /// Stream with IAC sequences removed.
    pub data: Vec<u8>,
    /// Bytes to write back to the peer (may be empty).
    pub replies: Vec<u8>,
    /// Window sizes (columns, rows) reported in this chunk, in order.
    pub resizes: Vec<(u16, u16)>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate {
        cmd: u8,
    },
    Subneg {
        opt: Option<u8>,
        iac_seen: bool,
        buf: Vec<u8>,
    },
}

/// Incremental telnet decoder.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: State,
}

impl TelnetDecoder {
    /// Create a decoder in the data state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of bytes.
    pub fn decode(&mut self, chunk: &[u8]) -> TelnetOutput {
        let mut out = TelnetOutput { data: Vec::with_capacity(chunk.len()), ..Default::default() };

        for &b in chunk {
            match &mut self.state {
                State::Data => {
                    if b == IAC {
                        self.state = State::Iac;
                    } else {
                        out.data.push(b);
                    }
                },
                State::Iac => match b {
                    // Escaped 0xff => literal 0xff.
                    IAC => {
                        out.data.push(IAC);
                        self.state = State::Data;
                    },
                    DO | DONT | WILL | WONT => self.state = State::Negotiate { cmd: b },
                    SB => self.state = State::Subneg { opt: None, iac_seen: false, buf: Vec::new() },
                    // NOP, GA, etc.
                    _ => self.state = State::Data,
                },
                State::Negotiate { cmd } => {
                    match (*cmd, b) {
                        (DO, OPT_ECHO | OPT_SGA) | (WILL, OPT_NAWS) => {},
                        (DO, opt) => out.replies.extend_from_slice(&[IAC, WONT, opt]),
                        (WILL, opt) => out.replies.extend_from_slice(&[IAC, DONT, opt]),
                        _ => {},
                    }
                    self.state = State::Data;
                },
                State::Subneg { opt, iac_seen, buf } => {
                    if opt.is_none() {
                        *opt = Some(b);
                        continue;
                    }

                    if *iac_seen {
                        *iac_seen = false;
                        match b {
                            SE => {
                                if *opt == Some(OPT_NAWS) {
                                    if let Some(size) = parse_naws(buf) {
                                        out.resizes.push(size);
                                    }
                                }
                                self.state = State::Data;
                            },
                            IAC if buf.len() < MAX_SUBNEG => buf.push(IAC),
                            // Unknown IAC within SB; ignore.
                            _ => {},
                        }
                        continue;
                    }

                    if b == IAC {
                        *iac_seen = true;
                    } else if buf.len() < MAX_SUBNEG {
                        buf.push(b);
                    }
                },
            }
        }

        out
    }
}

fn parse_naws(buf: &[u8]) -> Option<(u16, u16)> {
    let [c1, c0, r1, r0] = buf else {
        return None;
    };
    let cols = u16::from_be_bytes([*c1, *c0]);
    let rows = u16::from_be_bytes([*r1, *r0]);
    (cols > 0 && rows > 0).then_some((cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_plain_data() {
        let mut p = TelnetDecoder::new();
        let out = p.decode(b"hello\r\n");
        assert_eq!(out.data, b"hello\r\n");
        assert!(out.replies.is_empty());
        assert!(out.resizes.is_empty());
    }

    #[test]
    fn decodes_escaped_iac() {
        let mut p = TelnetDecoder::new();
        let out = p.decode(&[IAC, IAC, b'a']);
        assert_eq!(out.data, vec![IAC, b'a']);
    }

    #[test]
    fn acknowledges_own_offers_and_refuses_the_rest() {
        let mut p = TelnetDecoder::new();
        let out = p.decode(&[IAC, DO, OPT_ECHO, IAC, WILL, OPT_NAWS, IAC, DO, 24, IAC, WILL, 3, b'x']);
        assert_eq!(out.data, vec![b'x']);
        assert_eq!(out.replies, vec![IAC, WONT, 24, IAC, DONT, 3]);
    }

    #[test]
    fn reads_naws() {
        let mut p = TelnetDecoder::new();
        let out = p.decode(&[b'a', IAC, SB, OPT_NAWS, 0, 120, 0, 40, IAC, SE, b'b']);
        assert_eq!(out.data, vec![b'a', b'b']);
        assert_eq!(out.resizes, vec![(120, 40)]);
    }

    #[test]
    fn naws_with_escaped_iac_byte() {
        // 255 columns is sent as IAC IAC inside the subnegotiation.
        let mut p = TelnetDecoder::new();
        let out = p.decode(&[IAC, SB, OPT_NAWS, 0, IAC, IAC, 0, 50, IAC, SE]);
        assert_eq!(out.resizes, vec![(255, 50)]);
    }

    #[test]
    fn handles_sequences_split_across_calls() {
        let mut p = TelnetDecoder::new();
        let first = p.decode(&[IAC, SB, OPT_NAWS, 0]);
        assert!(first.data.is_empty());
        assert!(first.resizes.is_empty());

        let second = p.decode(&[80, 0, 24, IAC, SE, b'z']);
        assert_eq!(second.resizes, vec![(80, 24)]);
        assert_eq!(second.data, vec![b'z']);
    }

    #[test]
    fn strips_other_subnegotiation() {
        let mut p = TelnetDecoder::new();
        let out = p.decode(&[b'a', IAC, SB, 24, b'x', b'y', IAC, SE, b'b']);
        assert_eq!(out.data, vec![b'a', b'b']);
        assert!(out.resizes.is_empty());
    }

    #[test]
    fn ignores_zero_size() {
        let mut p = TelnetDecoder::new();
        let out = p.decode(&[IAC, SB, OPT_NAWS, 0, 0, 0, 0, IAC, SE]);
        assert!(out.resizes.is_empty());
    }
}
