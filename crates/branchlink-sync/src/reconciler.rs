//! # Sync Status Reconciler
//!
//! Read-only reporter of price drift between the authoritative record and
//! the branch record of each product.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   HEAD_OFFICE node, not standalone, local API configured                │
//! │                                                                         │
//! │   SyncStatusQuery ──► GET <local>/product-sync-status/ ──► Page         │
//! │   (filters, page,        ordering=branch_id,product_id                  │
//! │    page_size)                                                           │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │                                   ┌────────────────────────────────┐    │
//! │                                   │ SyncStatusPage                 │    │
//! │                                   │  out_of_sync()  is_synced=false│    │
//! │                                   │  inconsistent() flag ≠ prices  │    │
//! │                                   │  summary()                     │    │
//! │                                   └────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `is_synced` comes from the authoritative store and is never recomputed
//! here. Records whose flag disagrees with their prices are reported, not
//! corrected.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use ts_rs::TS;

use branchlink_core::{Page, SyncStatusQuery, SyncStatusRecord};

use crate::api::BranchApi;
use crate::config::NodeConfig;
use crate::error::SyncResult;
use crate::monitor::stop_requested;

/// Upper bound on pages walked by [`SyncStatusReconciler::list_all`].
const MAX_WALK_PAGES: u32 = 1_000;

// =============================================================================
// Sync Status Page
// =============================================================================

/// One page of sync-status records.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatusPage {
    pub page: Page<SyncStatusRecord>,
}

/// Counts for the operator's out-of-sync badge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSummary {
    /// Matching records across all pages.
    pub total: u64,
    /// Records on this page.
    pub on_page: u32,
    pub out_of_sync: u32,
    pub inconsistent: u32,
}

impl SyncStatusPage {
    pub fn records(&self) -> &[SyncStatusRecord] {
        &self.page.results
    }

    pub fn out_of_sync(&self) -> impl Iterator<Item = &SyncStatusRecord> {
        self.page.results.iter().filter(|r| !r.is_synced)
    }

    /// Records whose `is_synced` flag disagrees with their prices.
    pub fn inconsistent(&self) -> impl Iterator<Item = &SyncStatusRecord> {
        self.page.results.iter().filter(|r| !r.is_consistent())
    }

    pub fn summary(&self) -> SyncStatusSummary {
        SyncStatusSummary {
            total: self.page.total,
            on_page: self.page.results.len() as u32,
            out_of_sync: self.out_of_sync().count() as u32,
            inconsistent: self.inconsistent().count() as u32,
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Paginated sync-status reader for head-office nodes.
#[derive(Clone)]
pub struct SyncStatusReconciler {
    base: String,
    max_page_size: u32,
    api: Arc<dyn BranchApi>,
}

impl SyncStatusReconciler {
    /// Returns `None` unless this node is a connected head office with a
    /// local API.
    pub fn for_node(config: &NodeConfig, api: Arc<dyn BranchApi>) -> Option<Self> {
        let resolver = config.resolver();
        if !resolver.reconciler_enabled() {
            debug!("Sync-status reconciler disabled for this node");
            return None;
        }

        Some(SyncStatusReconciler {
            base: resolver.resolve_local()?.to_string(),
            max_page_size: config.settings.max_page_size,
            api,
        })
    }

    /// Fetches one page.
    pub async fn list(&self, query: &SyncStatusQuery) -> SyncResult<SyncStatusPage> {
        query.validate(self.max_page_size)?;

        let page = self.api.list_product_sync_status(&self.base, query).await?;
        let page = SyncStatusPage { page };

        for record in page.inconsistent() {
            warn!(
                branch_id = record.branch_id,
                product_id = record.product_id,
                expected = %record.expected_price_per_piece,
                current = %record.current_price_per_piece,
                drift = ?record.drift().map(|d| d.to_string()),
                is_synced = record.is_synced,
                "Sync flag disagrees with prices"
            );
        }

        debug!(
            page = query.page,
            total = page.page.total,
            out_of_sync = page.out_of_sync().count(),
            "Sync status page fetched"
        );
        Ok(page)
    }

    /// Walks every page from `query.page` onwards and concatenates the rows.
    pub async fn list_all(&self, query: &SyncStatusQuery) -> SyncResult<Vec<SyncStatusRecord>> {
        let mut query = query.clone();
        let mut records = Vec::new();

        for _ in 0..MAX_WALK_PAGES {
            let page = self.list(&query).await?.page;
            let has_next = page.has_next() && !page.is_empty();
            records.extend(page.results);
            if !has_next {
                return Ok(records);
            }
            query = query.next_page();
        }

        warn!(pages = MAX_WALK_PAGES, "Stopped walking sync status pages");
        Ok(records)
    }

    /// Re-fetches `query` every `interval` and publishes the latest page.
    ///
    /// Failed polls keep the previous page and are only logged.
    pub fn spawn_poller(&self, query: SyncStatusQuery, interval: Duration) -> PollerHandle {
        let (page_tx, page_rx) = watch::channel(None);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let reconciler = self.clone();

        info!(interval_ms = interval.as_millis() as u64, "Sync-status poller starting");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                let result = reconciler.list(&query).await;
                if stop_requested(&stop_rx) {
                    break;
                }

                match result {
                    Ok(page) => {
                        let _ = page_tx.send(Some(page));
                    }
                    Err(e) => warn!(error = %e, "Sync-status poll failed"),
                }
            }

            debug!("Sync-status poller stopped");
        });

        PollerHandle {
            page_rx,
            stop_tx,
            task,
        }
    }
}

// =============================================================================
// Poller Handle
// =============================================================================

/// Handle to a running sync-status poller.
///
/// Dropping the handle stops the poller; a fetch still in flight is
/// discarded.
pub struct PollerHandle {
    page_rx: watch::Receiver<Option<SyncStatusPage>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Most recent successful page, if any.
    pub fn latest(&self) -> Option<SyncStatusPage> {
        self.page_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SyncStatusPage>> {
        self.page_rx.clone()
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}
