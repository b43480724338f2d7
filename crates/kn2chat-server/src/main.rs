//! kn2chat server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the defaults (127.0.0.1:1337), everyone admitted anonymously
//! kn2chat-server
//!
//! # Reserve identities for their key holders, turn everyone else away
//! kn2chat-server --allowed-users allowed_users.toml --unknown-identities deny
//! ```
//!
//! Every flag also reads an environment variable (see `--help`); a `.env`
//! file in the working directory is loaded first.

use clap::Parser;
use kn2chat_server::{Args, Server};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kn2chat server starting");

    let config = args.into_config()?;
    if config.allow_set.is_empty() {
        tracing::warn!("No allow-set configured - every identity is unknown");
    }

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    let report = server.run_until(shutdown_signal()).await;
    if report.timed_out {
        tracing::info!(forced = report.forced, "stopped after closing sessions by force");
    } else {
        tracing::info!("stopped");
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
