//! Core of the kn2chat terminal chat server.
//!
//! Pure logic with no I/O: message values, the public-key admission gate,
//! the connection handshake, and the per-connection chat view state machine.
//! The server crate drives these with real sockets and a real clock.
//!
//! # Components
//!
//! - [`Message`]: Immutable chat message, shared cheaply during fan-out
//! - [`IdentityGate`]: Admission decision against a static [`AllowSet`]
//! - [`Challenge`] / [`AuthRequest`]: Handshake lines and possession proof
//! - [`ChatView`]: UI state machine (input line, transcript, terminal size)
//! - [`TelnetDecoder`] / [`KeyDecoder`]: Byte stream to [`ChatEvent`]s
//! - [`Environment`]: Time and randomness abstraction

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod message;
pub mod terminal;
pub mod view;

pub use env::Environment;
pub use error::{AllowSetError, HandshakeError, KeyError, MessageError};
pub use handshake::{AuthRequest, Challenge, PresentedKey};
pub use identity::{
    Admission, AllowSet, AllowSetFile, Fingerprint, IdentityGate, PublicKey, REJECTION_MESSAGE,
    UnknownIdentityPolicy,
};
pub use message::{MAX_MESSAGE_CHARS, Message};
pub use terminal::{KeyDecoder, TelnetDecoder, TelnetOutput};
pub use view::{ChatAction, ChatEvent, ChatView, KeyInput};
