//! kn2chat production server.
//!
//! Wraps [`kn2chat_core`]'s pure logic with real I/O: a TCP listener, one
//! Tokio task per connection, system time and cryptographic RNG.
//!
//! # Architecture
//!
//! The [`SessionRegistry`] is the only state shared between connection
//! tasks. Each admitted client owns a [`Session`] whose bounded mailbox the
//! registry fans messages into; a full or dropped mailbox gets that session
//! evicted without affecting anyone else. [`Server`] is the lifecycle
//! controller: it accepts until told to stop, then drains connections within
//! a bounded grace period.
//!
//! # Components
//!
//! - [`Server`]: Accept loop and bounded graceful shutdown
//! - [`SessionRegistry`]: Live sessions and message fan-out
//! - [`Session`] / [`Mailbox`]: Per-client delivery handle
//! - [`TcpTransport`]: Listening socket
//! - [`SystemEnv`]: Production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
mod connection;
mod error;
pub mod line;
mod registry;
pub mod render;
mod session;
mod system_env;
mod transport;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

pub use config::{Args, ServerConfig};
use connection::ConnectionContext;
pub use connection::SHUTDOWN_NOTICE;
pub use error::ServerError;
use kn2chat_core::{Environment, IdentityGate, Message};
pub use registry::{BroadcastReport, SessionRegistry};
pub use session::{Delivery, Mailbox, Session, SinkError};
pub use system_env::SystemEnv;
use tokio::{net::TcpStream, sync::watch, task::JoinSet};
pub use transport::TcpTransport;

/// Pause after running out of file descriptors before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How shutdown went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The grace period elapsed with connections still running.
    pub timed_out: bool,
    /// Sessions closed by force after the grace period.
    pub forced: usize,
}

/// Production kn2chat server.
///
/// Owns the listener, the registry, and every connection task.
pub struct Server {
    transport: TcpTransport,
    registry: Arc<SessionRegistry>,
    env: SystemEnv,
    context: ConnectionContext<SystemEnv>,
    shutting_down: watch::Sender<bool>,
    tasks: JoinSet<()>,
    grace: Duration,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let transport = TcpTransport::bind(&config.bind_address).await?;

        tracing::info!(
            identities = config.allow_set.len(),
            unknown_identities = %config.unknown_identities,
            "allow-set loaded"
        );

        let registry = Arc::new(SessionRegistry::new());
        let gate = IdentityGate::new(Arc::new(config.allow_set), config.unknown_identities);
        let (shutting_down, watcher) = watch::channel(false);

        let context = ConnectionContext {
            env: env.clone(),
            gate,
            registry: Arc::clone(&registry),
            mailbox_capacity: config.mailbox_capacity,
            handshake_timeout: config.handshake_timeout,
            shutting_down: watcher,
        };

        Ok(Self {
            transport,
            registry,
            env,
            context,
            shutting_down,
            tasks: JoinSet::new(),
            grace: config.grace,
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Shared session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `signal` resolves, then shut down with the
    /// configured grace period.
    ///
    /// An accept error that is not transient is treated like the signal.
    pub async fn run_until<F>(mut self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;
                () = &mut signal => {
                    tracing::info!("termination signal received");
                    break;
                },
                accepted = self.transport.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) if transport::is_transient(&e) => {
                        tracing::warn!("transient accept error: {}", e);
                        if transport::is_fd_exhaustion(&e) {
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },
                    Err(e) => {
                        tracing::error!("accept failed, shutting down: {}", e);
                        break;
                    },
                },
                Some(joined) = self.tasks.join_next() => log_join(joined),
            }
        }

        let grace = self.grace;
        self.shutdown(grace).await
    }

    /// Stop accepting, notify sessions, and wait up to `grace` for every
    /// connection to end. Whatever is left afterwards is closed by force.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        let Self { transport, registry, env, shutting_down, mut tasks, .. } = self;

        drop(transport);
        shutting_down.send_replace(true);

        tracing::info!(
            sessions = registry.session_count(),
            connections = tasks.len(),
            grace_secs = grace.as_secs_f64(),
            "shutting down"
        );

        if let Ok(notice) = Message::system(env.wall_clock_secs(), SHUTDOWN_NOTICE) {
            registry.broadcast(&notice);
        }

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        })
        .await;

        if drained.is_ok() {
            tracing::info!("shutdown complete");
            return ShutdownReport { timed_out: false, forced: 0 };
        }

        tracing::warn!(connections = tasks.len(), "shutdown grace period elapsed");
        let forced = force_close(&registry, &mut tasks).await;

        ShutdownReport { timed_out: true, forced }
    }

    fn spawn_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        tracing::debug!(%peer, "connection accepted");
        let context = self.context.clone();

        self.tasks.spawn(async move {
            if let Err(e) = connection::handle_connection(stream, peer, context).await {
                tracing::debug!(%peer, "connection error: {}", e);
            }
        });
    }
}

/// Close every session and abort every connection task.
///
/// Sessions are closed again once the tasks are gone: a connection that
/// registered after the first pass never reaches its own teardown.
async fn force_close(registry: &SessionRegistry, tasks: &mut JoinSet<()>) -> usize {
    let mut forced = registry.close_all();
    tasks.shutdown().await;
    forced += registry.close_all();
    forced
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    match joined {
        Err(e) if e.is_panic() => tracing::error!("connection task panicked: {}", e),
        _ => {},
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("transport", &self.transport)
            .field("sessions", &self.registry.session_count())
            .field("connections", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Registers its session when dropped, like a connection task aborted
    /// right after registering.
    struct RegisterOnDrop {
        registry: Arc<SessionRegistry>,
        session: Option<Arc<Session>>,
    }

    impl Drop for RegisterOnDrop {
        fn drop(&mut self) {
            if let Some(session) = self.session.take() {
                self.registry.register(session);
            }
        }
    }

    #[tokio::test]
    async fn force_close_catches_late_registrations() {
        let registry = Arc::new(SessionRegistry::new());
        let (early, _early_mailbox) = Session::new(1, "early", false, 4);
        registry.register(Arc::new(early));

        let (late, _late_mailbox) = Session::new(2, "late", false, 4);
        let late = Arc::new(late);
        let guard =
            RegisterOnDrop { registry: Arc::clone(&registry), session: Some(Arc::clone(&late)) };

        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });

        let forced = force_close(&registry, &mut tasks).await;

        assert_eq!(forced, 2);
        assert_eq!(registry.session_count(), 0);
        assert!(!late.is_open());
        assert!(tasks.is_empty());
    }
}
