//! # Background Sync Queue
//!
//! Makes sure locally-originated changes eventually reach the authoritative
//! store, without duplicate or overlapping confirm requests.
//!
//! ## Queue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Queue Worker                                │
//! │                                                                         │
//! │  enqueue("p-42") ──► pending set (BTreeMap, set semantics)             │
//! │                         │   + persist sync_pending = true               │
//! │                         ▼                                               │
//! │                   start drain (if none in flight)                       │
//! │                         │                                               │
//! │                         ▼                                               │
//! │          POST <target>/sync/confirm/ { ids: [snapshot] }                │
//! │                         │                                               │
//! │           ┌─────────────┴──────────────┐                                │
//! │           ▼                            ▼                                │
//! │        success                      failure                             │
//! │   remove snapshot ids           attempts += 1, warn!                    │
//! │   set empty? clear flag         retry_at = now + policy delay           │
//! │   more pending? drain again     (exactly one retry scheduled)           │
//! │                                                                         │
//! │  At most one confirm request is ever in flight. Commands (enqueue,      │
//! │  size, drain) are served while it is.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no dead-letter path: every failure is treated as transient and
//! retried on the policy's schedule.

use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use ts_rs::TS;

use branchlink_core::{PendingSyncItem, SYNC_RETRY_DELAY_MS};

use crate::agent::SyncEventEmitter;
use crate::api::BranchApi;
use crate::config::{keys, parse_flag, ConfigStore};
use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Queue Status
// =============================================================================

/// Observable queue state. Reading it has no side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Distinct pending identifiers.
    pub pending: usize,
    /// Persisted "sync pending" flag.
    pub sync_pending_flag: bool,
    /// A confirm request is in flight.
    pub draining: bool,
    /// A delayed retry is scheduled.
    pub retry_scheduled: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Result of one explicit [`SyncQueue::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was pending; no request was made.
    Empty,
    /// The confirm request succeeded for this many identifiers.
    Synced(usize),
    /// The confirm request failed; a retry is scheduled.
    Failed(String),
}

// =============================================================================
// Commands
// =============================================================================

enum QueueCommand {
    Enqueue {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    Drain {
        reply: oneshot::Sender<DrainOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<PendingSyncItem>>,
    },
    Shutdown,
}

type InFlight = Pin<Box<dyn Future<Output = (Vec<String>, SyncResult<()>)> + Send>>;

// =============================================================================
// Sync Queue (handle)
// =============================================================================

/// Handle to the queue worker. One instance owns the pending set and the
/// persisted flag for its service.
pub struct SyncQueue {
    cmd_tx: mpsc::Sender<QueueCommand>,
    status_rx: watch::Receiver<QueueStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncQueue {
    /// Spawns the worker.
    ///
    /// `target` is the base URL confirm requests are sent to. If the
    /// persisted flag is set but nothing is pending (the process stopped
    /// between enqueue and confirm), a resync is requested through the
    /// emitter.
    pub fn init(
        target: impl Into<String>,
        policy: RetryPolicy,
        api: Arc<dyn BranchApi>,
        store: Arc<dyn ConfigStore>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let target = target.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let flag = store
            .get(keys::SYNC_PENDING)
            .map(|raw| {
                parse_flag(keys::SYNC_PENDING, &raw).unwrap_or_else(|e| {
                    warn!(error = %e, "Unreadable sync_pending flag, treating as set");
                    true
                })
            })
            .unwrap_or(false);

        let status = QueueStatus {
            sync_pending_flag: flag,
            ..Default::default()
        };
        let (status_tx, status_rx) = watch::channel(status);

        if flag {
            warn!("Sync pending flag set with an empty queue; requesting resync");
            emitter.emit_resync_required();
        }

        info!(%target, ?policy, "Sync queue starting");

        let worker = QueueWorker {
            target,
            pending: BTreeMap::new(),
            backoff: policy.backoff(),
            retry_at: None,
            in_flight: None,
            waiters: Vec::new(),
            flag,
            consecutive_failures: 0,
            last_error: None,
            last_synced_at: None,
            api,
            store,
            emitter,
            status_tx,
            cmd_rx,
        };
        let task = tokio::spawn(worker.run());

        SyncQueue {
            cmd_tx,
            status_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Adds `key` and triggers a drain.
    ///
    /// Returns `false` when the key was already pending; that call changes
    /// nothing and triggers nothing.
    pub async fn enqueue(&self, key: impl Into<String>) -> SyncResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(QueueCommand::Enqueue {
            key: key.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Runs one drain and waits for its outcome.
    ///
    /// Joins the in-flight drain if there is one, so two drains never
    /// overlap.
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(QueueCommand::Drain { reply }).await?;
        rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Number of distinct pending identifiers.
    pub fn size(&self) -> usize {
        self.status_rx.borrow().pending
    }

    pub fn status(&self) -> QueueStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueueStatus> {
        self.status_rx.clone()
    }

    /// Copy of the pending items, in key order.
    pub async fn pending_items(&self) -> SyncResult<Vec<PendingSyncItem>> {
        let (reply, rx) = oneshot::channel();
        self.send(QueueCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Stops the worker. An in-flight confirm request is dropped; its items
    /// stay flagged as pending in the store.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(QueueCommand::Shutdown).await;

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(?e, "Sync queue task ended abnormally");
            }
        }
    }

    async fn send(&self, command: QueueCommand) -> SyncResult<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}

// =============================================================================
// Worker
// =============================================================================

struct QueueWorker {
    target: String,
    pending: BTreeMap<String, PendingSyncItem>,
    backoff: Box<dyn Backoff + Send>,
    retry_at: Option<Instant>,
    in_flight: Option<InFlight>,
    waiters: Vec<oneshot::Sender<DrainOutcome>>,
    flag: bool,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    api: Arc<dyn BranchApi>,
    store: Arc<dyn ConfigStore>,
    emitter: Arc<dyn SyncEventEmitter>,
    status_tx: watch::Sender<QueueStatus>,
    cmd_rx: mpsc::Receiver<QueueCommand>,
}

impl QueueWorker {
    async fn run(mut self) {
        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(QueueCommand::Enqueue { key, reply }) => {
                        let added = self.insert(key);
                        if added {
                            self.start_drain();
                        }
                        self.publish();
                        let _ = reply.send(added);
                    }
                    Some(QueueCommand::Drain { reply }) => self.request_drain(reply),
                    Some(QueueCommand::Snapshot { reply }) => {
                        let _ = reply.send(self.pending.values().cloned().collect());
                    }
                    Some(QueueCommand::Shutdown) | None => break,
                },

                (keys, result) = wait_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.finish_drain(keys, result);
                }

                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    debug!(pending = self.pending.len(), "Retrying sync queue drain");
                    self.retry_at = None;
                    self.start_drain();
                }
            }

            self.publish();
        }

        info!(pending = self.pending.len(), "Sync queue stopped");
    }

    fn insert(&mut self, key: String) -> bool {
        if self.pending.contains_key(&key) {
            debug!(%key, "Already queued");
            return false;
        }

        self.pending.insert(key.clone(), PendingSyncItem::new(key, Utc::now()));
        if !self.flag {
            self.set_flag(true);
        }
        true
    }

    fn request_drain(&mut self, reply: oneshot::Sender<DrainOutcome>) {
        if self.pending.is_empty() && self.in_flight.is_none() {
            if self.flag {
                self.set_flag(false);
            }
            self.publish();
            let _ = reply.send(DrainOutcome::Empty);
            return;
        }

        self.waiters.push(reply);
        self.start_drain();
    }

    /// Starts a confirm request for everything pending, unless one is
    /// already in flight. Cancels any scheduled retry.
    fn start_drain(&mut self) {
        if self.in_flight.is_some() || self.pending.is_empty() {
            return;
        }
        self.retry_at = None;

        let keys: Vec<String> = self.pending.keys().cloned().collect();
        let api = self.api.clone();
        let target = self.target.clone();

        debug!(count = keys.len(), %target, "Draining sync queue");

        self.in_flight = Some(Box::pin(async move {
            let result = api.confirm_sync(&target, &keys).await;
            (keys, result)
        }));
    }

    fn finish_drain(&mut self, keys: Vec<String>, result: SyncResult<()>) {
        match result {
            Ok(()) => {
                for key in &keys {
                    self.pending.remove(key);
                }
                self.backoff.reset();
                self.consecutive_failures = 0;
                self.last_error = None;
                self.last_synced_at = Some(Utc::now());

                if self.pending.is_empty() {
                    self.set_flag(false);
                }

                info!(synced = keys.len(), remaining = self.pending.len(), "Sync queue drained");
                self.emitter.emit_synced(&keys);
                self.reply_all(DrainOutcome::Synced(keys.len()));

                // Keys enqueued while the request was in flight.
                self.start_drain();
            }
            Err(e) => {
                for key in &keys {
                    if let Some(item) = self.pending.get_mut(key) {
                        item.attempts += 1;
                    }
                }
                self.consecutive_failures += 1;

                let delay = self
                    .backoff
                    .next_backoff()
                    .unwrap_or(Duration::from_millis(SYNC_RETRY_DELAY_MS));
                self.retry_at = Some(Instant::now() + delay);

                let message = e.to_string();
                warn!(
                    error = %message,
                    pending = self.pending.len(),
                    attempt = self.consecutive_failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Sync queue drain failed"
                );
                self.last_error = Some(message.clone());
                self.emitter.emit_error(&message, true);
                self.reply_all(DrainOutcome::Failed(message));
            }
        }
    }

    /// Publishes status first so a woken caller reads the new state.
    fn reply_all(&mut self, outcome: DrainOutcome) {
        self.publish();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn set_flag(&mut self, on: bool) {
        let result = if on {
            self.store.set(keys::SYNC_PENDING, "true")
        } else {
            self.store.remove(keys::SYNC_PENDING)
        };
        if let Err(e) = result {
            warn!(error = %e, on, "Failed to persist sync_pending flag");
        }
        self.flag = on;
    }

    fn publish(&self) {
        let status = QueueStatus {
            pending: self.pending.len(),
            sync_pending_flag: self.flag,
            draining: self.in_flight.is_some(),
            retry_scheduled: self.retry_at.is_some(),
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_synced_at: self.last_synced_at,
        };

        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
        if changed {
            self.emitter.emit_queue(&status);
        }
    }
}

async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> (Vec<String>, SyncResult<()>) {
    match in_flight {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_is_idle() {
        let status = QueueStatus::default();
        assert_eq!(status.pending, 0);
        assert!(!status.sync_pending_flag);
        assert!(!status.draining);
        assert!(!status.retry_scheduled);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_value(QueueStatus::default()).unwrap();
        assert!(json.get("syncPendingFlag").is_some());
        assert!(json.get("consecutiveFailures").is_some());
    }
}
