//! TCP transport.
//!
//! Plain TCP listener. Authentication happens in the handshake on top of it
//! (see [`kn2chat_core::handshake`]), and after admission the stream carries
//! telnet-compatible terminal traffic.

use std::{io, net::SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;

/// Listening socket for chat clients.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address` (`host:port`).
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {address}: {e}")))?;

        tracing::info!("TCP transport bound to {}", address);

        Ok(Self { listener })
    }

    /// Accept the next connection.
    ///
    /// Errors are returned as-is; use [`is_transient`] to decide whether the
    /// accept loop may continue.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        // Keystrokes are tiny; do not let Nagle batch them.
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Whether an accept error affects only one connection attempt.
///
/// Everything else (for example a closed or invalid listener) ends the accept
/// loop.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_fd_exhaustion(err)
}

/// EMFILE / ENFILE: out of file descriptors. Retrying after a pause helps.
pub fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23 | 24))
}
