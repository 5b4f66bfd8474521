//! # Connectivity Monitor
//!
//! Polls the online endpoint on a fixed interval, classifies each check and
//! publishes the resulting [`ConnectivityState`].
//!
//! ## Check Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Monitor Task                                     │
//! │                                                                         │
//! │   interval tick (5s presence / 10s head-office ping)                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   GET <online>/settings/site/  ──── awaited, never aborted              │
//! │        │                                                                │
//! │        ├── stop signalled meanwhile? ──► discard result, exit           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ConnectivityState::observe(outcome)                                   │
//! │        │                                                                │
//! │        ├── watch::Sender  ──► UI badge / read routing                   │
//! │        │                                                                │
//! │        └── transition? ──► tokio::spawn(POST <local>/connectivity-logs/)│
//! │                            best-effort, failures only logged            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The task owns the state; everyone else reads it through a
//! `watch::Receiver`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use branchlink_core::{BranchId, ConnectivityLogEntry, ConnectivityState, CheckOutcome, TransitionType};

use crate::agent::SyncEventEmitter;
use crate::api::BranchApi;
use crate::config::NodeConfig;

// =============================================================================
// Monitor Kind
// =============================================================================

/// Which of the two monitors this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorKind {
    /// "Am I online?" for the UI. Writes connectivity log entries.
    Presence,
    /// Head-office to online ping used for read routing. Silent.
    HeadOfficePing,
}

impl MonitorKind {
    fn interval(self, config: &NodeConfig) -> Duration {
        match self {
            MonitorKind::Presence => config.settings.presence_interval(),
            MonitorKind::HeadOfficePing => config.settings.ping_interval(),
        }
    }

    /// Only the presence monitor appends to the connectivity log.
    pub fn logs_transitions(self) -> bool {
        self == MonitorKind::Presence
    }
}

impl std::fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorKind::Presence => write!(f, "presence"),
            MonitorKind::HeadOfficePing => write!(f, "head_office_ping"),
        }
    }
}

// =============================================================================
// Monitor Handle
// =============================================================================

/// Handle to a running monitor.
///
/// Dropping the handle stops the task like [`MonitorHandle::stop`]: a check
/// still in flight completes but its result is discarded.
pub struct MonitorHandle {
    kind: MonitorKind,
    state_rx: watch::Receiver<ConnectivityState>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    /// Latest published state.
    pub fn state(&self) -> ConnectivityState {
        self.state_rx.borrow().clone()
    }

    /// `None` until the first check resolves.
    pub fn is_connected(&self) -> Option<bool> {
        self.state_rx.borrow().is_connected
    }

    /// Receiver that wakes on every published state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_rx.clone()
    }

    /// Signals the task to stop. An in-flight check completes but its
    /// result is discarded.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(kind = %self.kind, ?e, "Monitor task ended abnormally");
        }
    }
}

// =============================================================================
// Connectivity Monitor
// =============================================================================

/// Reachability poller for the online endpoint.
pub struct ConnectivityMonitor {
    kind: MonitorKind,
    check_url: String,
    log_url: String,
    branch_id: Option<BranchId>,
    interval: Duration,
    api: Arc<dyn BranchApi>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl ConnectivityMonitor {
    /// Builds a monitor for this node, or `None` when the enablement rule
    /// says it must not run.
    pub fn for_node(
        kind: MonitorKind,
        config: &NodeConfig,
        api: Arc<dyn BranchApi>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Option<Self> {
        let resolver = config.resolver();
        if !resolver.monitor_enabled() {
            debug!(%kind, "Connectivity monitor disabled for this node");
            return None;
        }

        Some(ConnectivityMonitor {
            kind,
            check_url: resolver.resolve_online()?.to_string(),
            log_url: resolver.resolve_local()?.to_string(),
            branch_id: config.identity.local_branch_id,
            interval: kind.interval(config),
            api,
            emitter,
        })
    }

    /// Overrides the check interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the check loop. The first check fires immediately.
    pub fn spawn(self) -> MonitorHandle {
        let (state_tx, state_rx) = watch::channel(ConnectivityState::unknown());
        let (stop_tx, stop_rx) = watch::channel(false);
        let kind = self.kind;

        info!(
            %kind,
            url = %self.check_url,
            interval_ms = self.interval.as_millis() as u64,
            "Connectivity monitor starting"
        );

        let task = tokio::spawn(self.run(state_tx, stop_rx));

        MonitorHandle {
            kind,
            state_rx,
            stop_tx,
            task,
        }
    }

    async fn run(self, state_tx: watch::Sender<ConnectivityState>, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_rx.changed() => break,
            }
            if stop_requested(&stop_rx) {
                break;
            }

            let result = self.api.fetch_site_settings(&self.check_url).await;

            if stop_requested(&stop_rx) {
                debug!(kind = %self.kind, "Discarding check result after stop");
                break;
            }

            if let Err(ref e) = result {
                debug!(kind = %self.kind, error = %e, "Check failed");
            }
            let outcome = CheckOutcome::from_result(&result);

            let mut transition = None;
            state_tx.send_modify(|state| transition = state.observe(outcome, Utc::now()));
            let state = state_tx.borrow().clone();
            self.emitter.emit_connectivity(self.kind, &state);

            if let Some(transition) = transition {
                info!(kind = %self.kind, %transition, "Connectivity changed");
                self.emitter.emit_transition(self.kind, transition);
                if self.kind.logs_transitions() {
                    self.log_transition(transition);
                }
            }
        }

        info!(kind = %self.kind, "Connectivity monitor stopped");
    }

    /// Appends the audit entry without holding up the check loop.
    fn log_transition(&self, transition: TransitionType) {
        let entry = ConnectivityLogEntry::new(self.branch_id, transition, Utc::now());
        let api = self.api.clone();
        let base = self.log_url.clone();

        tokio::spawn(async move {
            if let Err(e) = api.create_connectivity_log(&base, &entry).await {
                warn!(
                    branch_id = ?entry.branch_id,
                    transition = %entry.transition_type,
                    error = %e,
                    "Failed to write connectivity log"
                );
            }
        });
    }
}

/// True once a stop was signalled or the handle holding the sender is gone.
pub(crate) fn stop_requested(stop_rx: &watch::Receiver<bool>) -> bool {
    stop_rx.has_changed().is_err() || *stop_rx.borrow()
}
