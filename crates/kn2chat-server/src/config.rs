//! Server configuration.
//!
//! Command-line flags with environment fallbacks. `main` loads a `.env` file
//! first, so the precedence is: flag, then process environment, then `.env`,
//! then the defaults below.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use kn2chat_core::{AllowSet, AllowSetFile, UnknownIdentityPolicy};

use crate::error::ServerError;

/// Default listen host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 1337;
/// Default shutdown grace period, in seconds.
pub const DEFAULT_GRACE_SECS: u64 = 30;
/// Default per-session mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;
/// Default time a client has to complete the handshake, in seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// kn2chat server
#[derive(Parser, Debug, Clone)]
#[command(name = "kn2chat-server")]
#[command(about = "Multi-user terminal chat server")]
#[command(version)]
pub struct Args {
    /// Host to listen on
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// TOML file mapping identities to allowed public keys
    #[arg(short, long, env = "KN2_ALLOWED_USERS")]
    pub allowed_users: Option<PathBuf>,

    /// What to do with identities missing from the allow-set (admit, deny)
    #[arg(long, env = "KN2_UNKNOWN_IDENTITIES", default_value_t = UnknownIdentityPolicy::Admit)]
    pub unknown_identities: UnknownIdentityPolicy,

    /// Seconds to wait for sessions to end on shutdown
    #[arg(long, env = "KN2_GRACE_SECS", default_value_t = DEFAULT_GRACE_SECS)]
    pub grace_secs: u64,

    /// Messages buffered per session before it is evicted
    #[arg(long, env = "KN2_MAILBOX_CAPACITY", default_value_t = DEFAULT_MAILBOX_CAPACITY)]
    pub mailbox_capacity: usize,

    /// Seconds a client has to authenticate
    #[arg(long, env = "KN2_HANDSHAKE_TIMEOUT_SECS", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_SECS)]
    pub handshake_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "KN2_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate flags and load the allow-set.
    pub fn into_config(self) -> Result<ServerConfig, ServerError> {
        if self.mailbox_capacity == 0 {
            return Err(ServerError::Config("mailbox capacity must be at least 1".into()));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ServerError::Config("handshake timeout must be at least 1s".into()));
        }

        let allow_set = match &self.allowed_users {
            Some(path) => load_allow_set(path)?,
            None => AllowSet::new(),
        };

        Ok(ServerConfig {
            bind_address: bind_address(&self.host, self.port),
            allow_set,
            unknown_identities: self.unknown_identities,
            grace: Duration::from_secs(self.grace_secs),
            mailbox_capacity: self.mailbox_capacity,
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        })
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:1337")
    pub bind_address: String,
    /// Identities with their authorized keys
    pub allow_set: AllowSet,
    /// Policy for identities missing from `allow_set`
    pub unknown_identities: UnknownIdentityPolicy,
    /// Shutdown grace period
    pub grace: Duration,
    /// Per-session mailbox capacity
    pub mailbox_capacity: usize,
    /// Time allowed for the handshake
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: bind_address(DEFAULT_HOST, DEFAULT_PORT),
            allow_set: AllowSet::new(),
            unknown_identities: UnknownIdentityPolicy::default(),
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}

/// Read and validate an allow-set file.
pub fn load_allow_set(path: &std::path::Path) -> Result<AllowSet, ServerError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_allow_set(&contents).map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
}

/// Parse allow-set TOML.
pub fn parse_allow_set(contents: &str) -> Result<AllowSet, String> {
    let file: AllowSetFile = toml::from_str(contents).map_err(|e| e.to_string())?;
    AllowSet::from_file(file).map_err(|e| e.to_string())
}

/// `host:port`, bracketing bare IPv6 hosts.
fn bind_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
