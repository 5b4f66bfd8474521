//! # BranchSync Service
//!
//! Owns every BranchLink component of one process and their lifecycle.
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BranchSync Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         BranchSync                               │  │
//! │  │                                                                  │  │
//! │  │  • Built once at startup from an immutable NodeConfig           │  │
//! │  │  • init() starts what the node's identity enables               │  │
//! │  │  • Routes reads using the head-office ping state                │  │
//! │  │  • Forwards status to the UI through SyncEventEmitter           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │    ┌──────────────┬───────────┼──────────────┬──────────────┐          │
//! │    ▼              ▼           ▼              ▼              ▼           │
//! │ ┌────────┐  ┌──────────┐ ┌─────────┐  ┌────────────┐  ┌─────────┐     │
//! │ │Presence│  │HO ping   │ │SyncQueue│  │Reconciler  │  │Bulk     │     │
//! │ │monitor │  │monitor   │ │         │  │(HO only)   │  │service  │     │
//! │ └────────┘  └──────────┘ └─────────┘  └────────────┘  └─────────┘     │
//! │                                                                         │
//! │  A component whose configuration is absent is simply not started;      │
//! │  calls that need it return SyncError::FeatureDisabled.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use branchlink_core::{
    ConnectivityState, EndpointResolver, QueryParams, SyncStatusQuery, SyncStatusRecord, TransitionType,
};
use serde_json::Value;

use crate::api::BranchApi;
use crate::bulk::BulkService;
use crate::config::{ConfigStore, MemoryConfigStore, NodeConfig};
use crate::error::{SyncError, SyncResult};
use crate::monitor::{ConnectivityMonitor, MonitorHandle, MonitorKind};
use crate::queue::{DrainOutcome, QueueStatus, SyncQueue};
use crate::reconciler::{SyncStatusPage, SyncStatusReconciler};
use crate::retry::RetryPolicy;
use crate::transport::{paths, HttpBranchApi};

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives status changes for the UI layer.
///
/// Called from background tasks; implementations must not block.
pub trait SyncEventEmitter: Send + Sync {
    /// Every resolved check.
    fn emit_connectivity(&self, kind: MonitorKind, state: &ConnectivityState);

    /// A change between resolved online/offline classifications.
    fn emit_transition(&self, kind: MonitorKind, transition: TransitionType);

    /// Queue status changed.
    fn emit_queue(&self, status: &QueueStatus);

    /// These identifiers were confirmed.
    fn emit_synced(&self, ids: &[String]);

    /// The persisted flag outlived the pending set; local data should be
    /// rechecked with `initialize_ids`.
    fn emit_resync_required(&self);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// Emitter that drops everything.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_connectivity(&self, _kind: MonitorKind, _state: &ConnectivityState) {}
    fn emit_transition(&self, _kind: MonitorKind, _transition: TransitionType) {}
    fn emit_queue(&self, _status: &QueueStatus) {}
    fn emit_synced(&self, _ids: &[String]) {}
    fn emit_resync_required(&self) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// BranchSync
// =============================================================================

/// The BranchLink service for one process.
pub struct BranchSync {
    config: Arc<NodeConfig>,
    resolver: EndpointResolver,
    api: Arc<dyn BranchApi>,
    store: Arc<dyn ConfigStore>,
    emitter: Arc<dyn SyncEventEmitter>,
    retry_policy: RetryPolicy,

    presence: Option<MonitorHandle>,
    ping: Option<MonitorHandle>,
    queue: Option<SyncQueue>,
    reconciler: Option<SyncStatusReconciler>,
    bulk: Option<BulkService>,
    running: bool,
}

impl BranchSync {
    /// Creates the service over the HTTP client.
    pub fn new(config: NodeConfig, store: Arc<dyn ConfigStore>) -> SyncResult<Self> {
        BranchSyncBuilder::new(config).with_store(store).build()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts every component this node enables. Calling it twice is a
    /// no-op.
    pub async fn init(&mut self) -> SyncResult<()> {
        if self.running {
            debug!("BranchSync already running");
            return Ok(());
        }

        let config = self.config.clone();
        let identity = &config.identity;

        info!(
            app_type = %identity.app_type,
            role = ?identity.head_office_role,
            standalone = identity.standalone,
            local = ?self.resolver.resolve_local(),
            online = ?self.resolver.resolve_online(),
            "Starting BranchSync"
        );

        self.presence = ConnectivityMonitor::for_node(
            MonitorKind::Presence,
            &config,
            self.api.clone(),
            self.emitter.clone(),
        )
        .map(ConnectivityMonitor::spawn);

        if identity.is_head_office() {
            self.ping = ConnectivityMonitor::for_node(
                MonitorKind::HeadOfficePing,
                &config,
                self.api.clone(),
                self.emitter.clone(),
            )
            .map(ConnectivityMonitor::spawn);
        }

        let target = self
            .resolver
            .resolve_online()
            .or_else(|| self.resolver.resolve_local())
            .map(str::to_string);
        self.queue = match target {
            Some(target) => Some(SyncQueue::init(
                target,
                self.retry_policy,
                self.api.clone(),
                self.store.clone(),
                self.emitter.clone(),
            )),
            None => {
                debug!("No API configured, sync queue disabled");
                None
            }
        };

        self.reconciler = SyncStatusReconciler::for_node(&config, self.api.clone());
        self.bulk = BulkService::for_node(&config, self.api.clone());
        self.running = true;

        info!(
            presence = self.presence.is_some(),
            ping = self.ping.is_some(),
            queue = self.queue.is_some(),
            reconciler = self.reconciler.is_some(),
            bulk = self.bulk.is_some(),
            "BranchSync started"
        );
        Ok(())
    }

    /// Stops every background task and waits for them to exit.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        if !self.running {
            return Ok(());
        }
        info!("Shutting down BranchSync");

        if let Some(handle) = self.presence.take() {
            handle.shutdown().await;
        }
        if let Some(handle) = self.ping.take() {
            handle.shutdown().await;
        }
        if let Some(queue) = self.queue.take() {
            queue.shutdown().await;
        }
        self.reconciler = None;
        self.bulk = None;
        self.running = false;

        info!("BranchSync stopped");
        Ok(())
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    /// Presence state for the UI badge. Unknown when the monitor is not
    /// running.
    pub fn connectivity(&self) -> ConnectivityState {
        self.presence
            .as_ref()
            .map(MonitorHandle::state)
            .unwrap_or_else(ConnectivityState::unknown)
    }

    /// `{ isConnected }` as the UI reads it.
    pub fn is_connected(&self) -> Option<bool> {
        self.presence.as_ref().and_then(MonitorHandle::is_connected)
    }

    pub fn subscribe_connectivity(&self) -> Option<watch::Receiver<ConnectivityState>> {
        self.presence.as_ref().map(MonitorHandle::subscribe)
    }

    /// Head-office ping state. Unknown on other nodes.
    pub fn head_office_ping(&self) -> ConnectivityState {
        self.ping
            .as_ref()
            .map(MonitorHandle::state)
            .unwrap_or_else(ConnectivityState::unknown)
    }

    /// Base URL for reads right now: online while the head-office ping
    /// succeeds, local otherwise.
    pub fn read_base(&self) -> Option<String> {
        let is_connected = self.ping.as_ref().and_then(MonitorHandle::is_connected);
        self.resolver.resolve_read(is_connected).map(str::to_string)
    }

    // =========================================================================
    // Sync Queue
    // =========================================================================

    fn queue(&self) -> SyncResult<&SyncQueue> {
        self.queue.as_ref().ok_or(SyncError::FeatureDisabled("sync queue"))
    }

    pub async fn enqueue(&self, key: impl Into<String>) -> SyncResult<bool> {
        self.queue()?.enqueue(key).await
    }

    /// Re-drains the queue now.
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        self.queue()?.drain().await
    }

    /// Pending identifiers. Zero when the queue is disabled.
    pub fn queue_size(&self) -> usize {
        self.queue.as_ref().map(SyncQueue::size).unwrap_or(0)
    }

    pub fn queue_status(&self) -> Option<QueueStatus> {
        self.queue.as_ref().map(SyncQueue::status)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    pub fn reconciler(&self) -> SyncResult<&SyncStatusReconciler> {
        self.reconciler
            .as_ref()
            .ok_or(SyncError::FeatureDisabled("sync-status reconciler"))
    }

    pub async fn list_sync_status(&self, query: &SyncStatusQuery) -> SyncResult<SyncStatusPage> {
        self.reconciler()?.list(query).await
    }

    /// Enqueues every out-of-sync record matching `query`, across all
    /// pages. Returns how many were newly queued.
    pub async fn requeue_out_of_sync(&self, query: &SyncStatusQuery) -> SyncResult<usize> {
        let query = query.clone().out_of_sync_only();
        let records = self.reconciler()?.list_all(&query).await?;
        let queue = self.queue()?;

        let mut added = 0;
        for record in records.iter().filter(|r| !r.is_synced) {
            if queue.enqueue(sync_key(record)).await? {
                added += 1;
            }
        }

        info!(found = records.len(), added, "Requeued out-of-sync products");
        Ok(added)
    }

    // =========================================================================
    // Bulk & Listings
    // =========================================================================

    pub fn bulk(&self) -> SyncResult<&BulkService> {
        self.bulk.as_ref().ok_or(SyncError::FeatureDisabled("bulk service"))
    }

    /// Tags from the local API (`offline/tags/` unless standalone).
    pub async fn list_tags(&self) -> SyncResult<Vec<Value>> {
        self.list_local_mirror(paths::TAGS).await
    }

    /// Types from the local API (`offline/types/` unless standalone).
    pub async fn list_types(&self) -> SyncResult<Vec<Value>> {
        self.list_local_mirror(paths::TYPES).await
    }

    pub async fn list_products(&self, params: &QueryParams) -> SyncResult<Vec<Value>> {
        let base = self.read_base().ok_or(SyncError::FeatureDisabled("product listing"))?;
        self.api.list(&base, paths::PRODUCTS, params).await
    }

    pub async fn list_branch_products(&self, params: &QueryParams) -> SyncResult<Vec<Value>> {
        let base = self
            .read_base()
            .ok_or(SyncError::FeatureDisabled("branch product listing"))?;
        self.api.list(&base, paths::BRANCH_PRODUCTS, params).await
    }

    async fn list_local_mirror(&self, path: &str) -> SyncResult<Vec<Value>> {
        let base = self
            .resolver
            .resolve_local()
            .ok_or(SyncError::FeatureDisabled("local listing"))?;
        let path = format!("{}{}", self.resolver.listing_prefix(), path);
        self.api.list(base, &path, &Vec::new()).await
    }
}

/// Queue key of a sync-status record.
pub fn sync_key(record: &SyncStatusRecord) -> String {
    format!("{}:{}", record.branch_id, record.product_id)
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`BranchSync`].
pub struct BranchSyncBuilder {
    config: NodeConfig,
    api: Option<Arc<dyn BranchApi>>,
    store: Option<Arc<dyn ConfigStore>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    retry_policy: Option<RetryPolicy>,
}

impl BranchSyncBuilder {
    pub fn new(config: NodeConfig) -> Self {
        BranchSyncBuilder {
            config,
            api: None,
            store: None,
            emitter: None,
            retry_policy: None,
        }
    }

    /// Replaces the HTTP client.
    pub fn with_api(mut self, api: Arc<dyn BranchApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Store holding the persisted sync flag. Defaults to memory.
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Overrides the policy from the settings.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn build(self) -> SyncResult<BranchSync> {
        let api: Arc<dyn BranchApi> = match self.api {
            Some(api) => api,
            None => Arc::new(HttpBranchApi::from_settings(&self.config.settings)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryConfigStore::new()));
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));
        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| self.config.settings.retry_policy());

        Ok(BranchSync {
            resolver: self.config.resolver(),
            config: Arc::new(self.config),
            api,
            store,
            emitter,
            retry_policy,
            presence: None,
            ping: None,
            queue: None,
            reconciler: None,
            bulk: None,
            running: false,
        })
    }
}
