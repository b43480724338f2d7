//! Server error types.

use std::fmt;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable allow-set, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, I/O error, etc.).
    ///
    /// Fatal when binding the listener; per-connection otherwise.
    Transport(String),

    /// Protocol error (bad handshake line, handshake timeout, etc.).
    ///
    /// Fatal for that connection only.
    Protocol(String),

    /// Internal error (unexpected state, logic bug, etc.).
    ///
    /// Should never happen in correct implementation. Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<kn2chat_core::HandshakeError> for ServerError {
    fn from(err: kn2chat_core::HandshakeError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<crate::line::LineError> for ServerError {
    fn from(err: crate::line::LineError) -> Self {
        match err {
            crate::line::LineError::Io(err) => err.into(),
            other => Self::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_layer() {
        assert_eq!(ServerError::Config("x".into()).to_string(), "configuration error: x");
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        assert_eq!(ServerError::from(io).to_string(), "transport error: in use");
        let hs = ServerError::from(kn2chat_core::HandshakeError::NotAuth);
        assert!(matches!(hs, ServerError::Protocol(_)));
        let line = ServerError::from(crate::line::LineError::TooLong(16));
        assert_eq!(line.to_string(), "protocol error: handshake line exceeds 16 bytes");
    }
}
