//! # Beacon Daemon
//!
//! Unattended hold-light agent for one meeting room.
//!
//! ## Boot Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Beacon Daemon                                  │
//! │                                                                         │
//! │  1. tracing subscriber (RUST_LOG, default info,beacon=debug,sqlx=warn) │
//! │  2. AgentConfig::load  (defaults → beacon.toml → BEACON_* env)         │
//! │  3. Database::new      (SQLite, migrations)                            │
//! │  4. BeaconAgent::start (token load, initial discovery, session loop)   │
//! │  5. stdin lines ──► AgentHandle::handle_event                          │
//! │                                                                         │
//! │  Ctrl+C / SIGTERM / end of input ──► agent shutdown ──► db close       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! beacon-daemon [CONFIG_PATH]          run the agent
//! beacon-daemon --init [CONFIG_PATH]   write a config template and exit
//! ```

mod event_source;

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use beacon_agent::{AgentConfig, BeaconAgent};
use beacon_db::{Database, DbConfig};

const DEFAULT_LOG_FILTER: &str = "info,beacon=debug,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1).peekable();
    if args.peek().map(String::as_str) == Some("--init") {
        args.next();
        let path = args.next().map(PathBuf::from);
        AgentConfig::default()
            .save(path)
            .context("Failed to write config template")?;
        return Ok(());
    }
    let config_path = args.next().map(PathBuf::from);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting beacon daemon"
    );

    let config = AgentConfig::load(config_path)
        .context("Failed to load configuration")?;
    info!(
        base_url = %config.cloud.base_url,
        dwell_secs = config.session.dwell_secs,
        revert_on_occupancy = config.session.revert_on_occupancy,
        "Configuration loaded"
    );

    let db_path = config.database_path();
    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    info!(path = %db_path.display(), "Database ready");

    let agent = BeaconAgent::new(config, &db)?
        .start()
        .await
        .context("Failed to start beacon agent")?;

    let (event_tx, mut event_rx) = mpsc::channel(32);
    let reader = tokio::spawn(event_source::forward_events(
        BufReader::new(tokio::io::stdin()),
        event_tx,
    ));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => {
                    if let Err(e) = agent.handle_event(event).await {
                        error!(
                            retryable = e.is_retryable(),
                            error = %e,
                            "Failed to handle local event"
                        );
                    }
                }
                None => {
                    info!("Event input closed");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    reader.abort();

    if let Err(e) = agent.shutdown().await {
        warn!(error = %e, "Agent already stopped");
    }
    db.close().await;

    info!("Beacon daemon stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
