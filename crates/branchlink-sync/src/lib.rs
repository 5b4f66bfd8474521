//! # branchlink-sync: Connectivity and Sync Engine for BranchLink
//!
//! Everything in BranchLink that talks to the network or runs in the
//! background: connectivity monitors, the sync-status reconciler, the
//! background sync queue, bulk initialize/export, and the HTTP client they
//! share.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BranchSync Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   BranchSync (agent.rs)                          │  │
//! │  │                                                                  │  │
//! │  │  One per process, built from NodeConfig at startup              │  │
//! │  │  init() / shutdown() own every background task                   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │  SyncQueue     │  │ SyncStatusReconciler   │    │
//! │  │ Monitor        │  │                │  │                        │    │
//! │  │ 5s presence    │  │ Set of pending │  │ Paged drift report     │    │
//! │  │ 10s HO ping    │  │ ids, single-   │  │ for head offices       │    │
//! │  │ transition log │  │ flight retry   │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ BulkService    │  │ HttpBranchApi  │  │ ConfigStore            │    │
//! │  │ snapshot/export│  │ reqwest client │  │ memory / TOML file     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  STATUS EVENTS (to the UI via SyncEventEmitter):                       │
//! │  • connectivity - every resolved check                                 │
//! │  • transition   - ONLINE_TO_OFFLINE / OFFLINE_TO_ONLINE                │
//! │  • queue        - pending count, retry state                           │
//! │  • synced       - confirmed identifiers                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `BranchSync` service, builder and event emitter
//! - [`config`] - Config stores, `NodeConfig`, `SyncSettings`
//! - [`api`] - `BranchApi` trait and wire types
//! - [`transport`] - reqwest implementation of `BranchApi`
//! - [`monitor`] - Connectivity monitors
//! - [`reconciler`] - Sync-status reconciler
//! - [`queue`] - Background sync queue
//! - [`bulk`] - Bulk initialize and report export
//! - [`retry`] - Retry policies
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use branchlink_sync::{BranchSync, FileConfigStore, NodeConfig};
//!
//! let store = Arc::new(FileConfigStore::open_default()?);
//! let config = NodeConfig::load(store.as_ref())?;
//!
//! let mut sync = BranchSync::new(config, store)?;
//! sync.init().await?;
//!
//! sync.enqueue("3:42").await?;
//! println!("Connected: {:?}", sync.is_connected());
//! println!("Pending: {}", sync.queue_size());
//!
//! sync.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod api;
pub mod bulk;
pub mod config;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod reconciler;
pub mod retry;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{sync_key, BranchSync, BranchSyncBuilder, NoOpEmitter, SyncEventEmitter};
pub use api::{BranchApi, BulkIds, BulkSnapshot, ExportBatch, ReportArtifact, SiteSettings};
pub use bulk::{BulkService, ExportSummary, PlainTextFormatter, ReportFormatter, SubmittedBatch};
pub use config::{ConfigStore, FileConfigStore, MemoryConfigStore, NodeConfig, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use monitor::{ConnectivityMonitor, MonitorHandle, MonitorKind};
pub use queue::{DrainOutcome, QueueStatus, SyncQueue};
pub use reconciler::{PollerHandle, SyncStatusPage, SyncStatusReconciler, SyncStatusSummary};
pub use retry::{RetryKind, RetryPolicy};
pub use transport::HttpBranchApi;
