//! Byte-level terminal protocol.
//!
//! After the handshake a connection carries a telnet-compatible byte stream.
//! [`TelnetDecoder`] strips option negotiation and extracts window-size
//! reports; [`KeyDecoder`] turns the remaining bytes into [`crate::KeyInput`]s.
//! Both are incremental: sequences may be split across reads.

mod keys;
mod telnet;

pub use keys::KeyDecoder;
pub use telnet::{TelnetDecoder, TelnetOutput, server_negotiation};
