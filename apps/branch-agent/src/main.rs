//! # BranchLink Agent
//!
//! Headless host for one node's BranchSync service.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  RUST_LOG ──► tracing subscriber                                        │
//! │                                                                         │
//! │  BRANCHLINK_CONFIG or <config_dir>/node.toml ──► FileConfigStore        │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                NodeConfig::load (store, then BRANCHLINK_* env)          │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │            BranchSync::init ── runs until Ctrl+C / SIGTERM ──► shutdown │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use branchlink_core::{ConnectivityState, TransitionType};
use branchlink_sync::{
    BranchSyncBuilder, FileConfigStore, MonitorKind, NodeConfig, QueueStatus, SyncEventEmitter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting branch agent");

    let store = Arc::new(open_store()?);
    info!(path = %store.path().display(), "Config store opened");

    let config = NodeConfig::load(store.as_ref()).context("loading node configuration")?;

    let mut sync = BranchSyncBuilder::new(config)
        .with_store(store)
        .with_emitter(Arc::new(LogEmitter))
        .build()
        .context("building sync service")?;

    sync.init().await.context("starting sync service")?;

    shutdown_signal().await;

    info!(pending = sync.queue_size(), "Stopping branch agent");
    sync.shutdown().await?;

    info!("Branch agent stopped");
    Ok(())
}

fn open_store() -> anyhow::Result<FileConfigStore> {
    match std::env::var_os("BRANCHLINK_CONFIG") {
        Some(path) => FileConfigStore::open(PathBuf::from(path)).context("opening BRANCHLINK_CONFIG"),
        None => FileConfigStore::open_default().context("opening default config store"),
    }
}

/// Emitter that turns status events into log lines.
struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn emit_connectivity(&self, kind: MonitorKind, state: &ConnectivityState) {
        tracing::debug!(%kind, is_connected = ?state.is_connected, "Connectivity");
    }

    fn emit_transition(&self, kind: MonitorKind, transition: TransitionType) {
        info!(%kind, %transition, "Connectivity transition");
    }

    fn emit_queue(&self, status: &QueueStatus) {
        info!(
            pending = status.pending,
            retry_scheduled = status.retry_scheduled,
            failures = status.consecutive_failures,
            "Sync queue"
        );
    }

    fn emit_synced(&self, ids: &[String]) {
        info!(count = ids.len(), "Items synced");
    }

    fn emit_resync_required(&self) {
        warn!("Unconfirmed changes from a previous run; local data needs a resync");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(retryable, "{}", message);
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
