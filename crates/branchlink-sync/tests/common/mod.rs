//! In-process `BranchApi` fake and recording emitter shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use branchlink_core::{
    BranchId, BulkScope, ConnectivityLogEntry, ConnectivityState, EndpointSet, HeadOfficeRole,
    Money, NodeIdentity, Page, QueryParams, ReportKind, SyncStatusQuery, SyncStatusRecord,
    TimeRange, TransitionType,
};
use branchlink_sync::{
    BranchApi, BulkIds, BulkSnapshot, ExportBatch, MonitorKind, NodeConfig, QueueStatus,
    SiteSettings, SyncError, SyncEventEmitter, SyncResult, SyncSettings,
};

pub const LOCAL: &str = "http://10.0.0.5:8000/api";
pub const ONLINE: &str = "https://ho.example.com/api";

// ── Node configs ────────────────────────────────────────────────

pub fn branch_node() -> NodeConfig {
    NodeConfig {
        identity: NodeIdentity::branch(3),
        endpoints: EndpointSet::new(Some(LOCAL), Some(ONLINE)),
        settings: SyncSettings::default(),
    }
}

pub fn head_office_node() -> NodeConfig {
    NodeConfig {
        identity: NodeIdentity::head_office(HeadOfficeRole::Main),
        endpoints: EndpointSet::new(Some(LOCAL), Some(ONLINE)),
        settings: SyncSettings::default(),
    }
}

pub fn standalone_branch_node() -> NodeConfig {
    let mut config = branch_node();
    config.identity.standalone = true;
    config
}

pub fn sync_record(product_id: i64, expected: i64, current: i64) -> SyncStatusRecord {
    SyncStatusRecord {
        branch_id: 3,
        product_id,
        expected_price_per_piece: Money::from_cents(expected),
        current_price_per_piece: Money::from_cents(current),
        is_synced: expected == current,
        last_reported_at: chrono::Utc::now(),
        details: Value::Null,
    }
}

// ── Recorded calls ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Call {
    Check { base: String, at: Instant },
    Log { base: String, entry: ConnectivityLogEntry },
    SyncStatus { base: String, query: SyncStatusQuery },
    Confirm { base: String, ids: Vec<String>, at: Instant },
    BulkInitialize { base: String, scope: BulkScope },
    BulkInitializeIds { base: String, scope: BulkScope },
    Reports { base: String, kind: ReportKind, at: Instant },
    Export { base: String, batch: ExportBatch, at: Instant },
    List { base: String, path: String },
}

// ── Fake API ────────────────────────────────────────────────────

/// Scripted `BranchApi`.
///
/// Check outcomes are consumed in order; once the script runs out the last
/// outcome repeats.
#[derive(Default)]
pub struct FakeApi {
    checks: Mutex<VecDeque<bool>>,
    last_check: Mutex<Option<bool>>,
    check_delay: Mutex<Duration>,
    confirm_failures: AtomicUsize,
    confirm_delay: Mutex<Duration>,
    sync_status: Mutex<Vec<SyncStatusRecord>>,
    sync_status_delay: Mutex<Duration>,
    reports: Mutex<HashMap<ReportKind, SyncResult<Vec<Value>>>>,
    report_delay: Mutex<Duration>,
    failing_exports: Mutex<Vec<ReportKind>>,
    listings: Mutex<Vec<Value>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_checks(&self, outcomes: &[bool]) {
        self.checks.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn set_check_delay(&self, delay: Duration) {
        *self.check_delay.lock().unwrap() = delay;
    }

    /// The next `n` confirm calls fail.
    pub fn fail_confirms(&self, n: usize) {
        self.confirm_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_confirm_delay(&self, delay: Duration) {
        *self.confirm_delay.lock().unwrap() = delay;
    }

    pub fn set_sync_status(&self, records: Vec<SyncStatusRecord>) {
        *self.sync_status.lock().unwrap() = records;
    }

    pub fn set_sync_status_delay(&self, delay: Duration) {
        *self.sync_status_delay.lock().unwrap() = delay;
    }

    pub fn set_reports(&self, kind: ReportKind, records: Vec<Value>) {
        self.reports.lock().unwrap().insert(kind, Ok(records));
    }

    pub fn fail_reports(&self, kind: ReportKind) {
        self.reports
            .lock()
            .unwrap()
            .insert(kind, Err(SyncError::ConnectionFailed("reports down".into())));
    }

    /// Submits of batches of `kind` are rejected with a 500.
    pub fn fail_exports(&self, kind: ReportKind) {
        self.failing_exports.lock().unwrap().push(kind);
    }

    pub fn set_report_delay(&self, delay: Duration) {
        *self.report_delay.lock().unwrap() = delay;
    }

    pub fn set_listing(&self, items: Vec<Value>) {
        *self.listings.lock().unwrap() = items;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn check_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Check { .. }))
            .count()
    }

    pub fn logs(&self) -> Vec<(String, ConnectivityLogEntry)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Log { base, entry } => Some((base, entry)),
                _ => None,
            })
            .collect()
    }

    pub fn confirms(&self) -> Vec<(String, Vec<String>, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Confirm { base, ids, at } => Some((base, ids, at)),
                _ => None,
            })
            .collect()
    }

    pub fn exports(&self) -> Vec<(String, ExportBatch, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Export { base, batch, at } => Some((base, batch, at)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_check(&self) -> bool {
        let next = self.checks.lock().unwrap().pop_front();
        let mut last = self.last_check.lock().unwrap();
        match next {
            Some(ok) => {
                *last = Some(ok);
                ok
            }
            None => last.unwrap_or(true),
        }
    }
}

#[async_trait]
impl BranchApi for FakeApi {
    async fn fetch_site_settings(&self, base: &str) -> SyncResult<SiteSettings> {
        self.record(Call::Check {
            base: base.to_string(),
            at: Instant::now(),
        });
        let ok = self.next_check();

        let delay = *self.check_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if ok {
            Ok(json!({ "site_name": "Main Street" }))
        } else {
            Err(SyncError::ConnectionFailed("check refused".into()))
        }
    }

    async fn create_connectivity_log(&self, base: &str, entry: &ConnectivityLogEntry) -> SyncResult<()> {
        self.record(Call::Log {
            base: base.to_string(),
            entry: entry.clone(),
        });
        Ok(())
    }

    async fn list_product_sync_status(
        &self,
        base: &str,
        query: &SyncStatusQuery,
    ) -> SyncResult<Page<SyncStatusRecord>> {
        self.record(Call::SyncStatus {
            base: base.to_string(),
            query: query.clone(),
        });

        let delay = *self.sync_status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let records: Vec<SyncStatusRecord> = self
            .sync_status
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !query.out_of_sync_only || !r.is_synced)
            .filter(|r| query.branch_id.map_or(true, |id| r.branch_id == id))
            .cloned()
            .collect();

        let start = ((query.page - 1) * query.page_size) as usize;
        let results = records
            .iter()
            .skip(start)
            .take(query.page_size as usize)
            .cloned()
            .collect();

        Ok(Page::new(results, records.len() as u64, query.page, query.page_size))
    }

    async fn confirm_sync(&self, base: &str, ids: &[String]) -> SyncResult<()> {
        self.record(Call::Confirm {
            base: base.to_string(),
            ids: ids.to_vec(),
            at: Instant::now(),
        });

        let delay = *self.confirm_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .confirm_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(SyncError::HttpStatus {
                status: 503,
                url: format!("{}/sync/confirm/", base),
            })
        } else {
            Ok(())
        }
    }

    async fn bulk_initialize(&self, base: &str, scope: &BulkScope) -> SyncResult<BulkSnapshot> {
        self.record(Call::BulkInitialize {
            base: base.to_string(),
            scope: scope.clone(),
        });
        Ok(BulkSnapshot {
            products: vec![json!({ "id": 1 }), json!({ "id": 2 })],
            branch_products: vec![json!({ "id": 10 })],
            extra: Default::default(),
        })
    }

    async fn bulk_initialize_ids(&self, base: &str, scope: &BulkScope) -> SyncResult<BulkIds> {
        self.record(Call::BulkInitializeIds {
            base: base.to_string(),
            scope: scope.clone(),
        });
        Ok(BulkIds {
            product_ids: vec![1, 2],
            branch_product_ids: vec![10],
        })
    }

    async fn list_reports(
        &self,
        base: &str,
        kind: ReportKind,
        _range: &TimeRange,
        _branch_id: Option<BranchId>,
    ) -> SyncResult<Vec<Value>> {
        self.record(Call::Reports {
            base: base.to_string(),
            kind,
            at: Instant::now(),
        });

        let delay = *self.report_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.reports.lock().unwrap().get(&kind) {
            Some(Ok(records)) => Ok(records.clone()),
            Some(Err(_)) => Err(SyncError::ConnectionFailed("reports down".into())),
            None => Ok(Vec::new()),
        }
    }

    async fn submit_bulk_export(&self, base: &str, batch: &ExportBatch) -> SyncResult<()> {
        self.record(Call::Export {
            base: base.to_string(),
            batch: batch.clone(),
            at: Instant::now(),
        });

        if self.failing_exports.lock().unwrap().contains(&batch.kind) {
            return Err(SyncError::HttpStatus {
                status: 500,
                url: format!("{}/bulk/export/", base),
            });
        }
        Ok(())
    }

    async fn list(&self, base: &str, path: &str, _params: &QueryParams) -> SyncResult<Vec<Value>> {
        self.record(Call::List {
            base: base.to_string(),
            path: path.to_string(),
        });
        Ok(self.listings.lock().unwrap().clone())
    }
}

// ── Recording emitter ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEmitter {
    pub transitions: Mutex<Vec<(MonitorKind, TransitionType)>>,
    pub connectivity: Mutex<Vec<(MonitorKind, ConnectivityState)>>,
    pub queue: Mutex<Vec<QueueStatus>>,
    pub synced: Mutex<Vec<Vec<String>>>,
    pub resync_required: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transitions(&self) -> Vec<(MonitorKind, TransitionType)> {
        self.transitions.lock().unwrap().clone()
    }
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit_connectivity(&self, kind: MonitorKind, state: &ConnectivityState) {
        self.connectivity.lock().unwrap().push((kind, state.clone()));
    }

    fn emit_transition(&self, kind: MonitorKind, transition: TransitionType) {
        self.transitions.lock().unwrap().push((kind, transition));
    }

    fn emit_queue(&self, status: &QueueStatus) {
        self.queue.lock().unwrap().push(status.clone());
    }

    fn emit_synced(&self, ids: &[String]) {
        self.synced.lock().unwrap().push(ids.to_vec());
    }

    fn emit_resync_required(&self) {
        self.resync_required.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_error(&self, message: &str, _retryable: bool) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}
