//! # Branch API
//!
//! The REST surface shared by the local branch API and the online
//! head-office API. Both speak the same paths; only the base URL differs,
//! and every call takes it explicitly so the caller's routing decision is
//! visible at the call site.
//!
//! ```text
//! ┌───────────────────┐    base = resolve_online()   ┌──────────────────────┐
//! │                   │ ───────────────────────────► │  online API          │
//! │  Monitor / Queue  │                              │  (head office)       │
//! │  Reconciler / Bulk│    base = resolve_local()    ├──────────────────────┤
//! │                   │ ───────────────────────────► │  local branch API    │
//! └───────────────────┘                              └──────────────────────┘
//! ```
//!
//! [`HttpBranchApi`](crate::transport::HttpBranchApi) is the production
//! implementation; tests substitute in-process fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use branchlink_core::{
    BranchId, BulkScope, ConnectivityLogEntry, Page, ProductId, QueryParams, ReportKind,
    SyncStatusQuery, SyncStatusRecord, TimeRange,
};

use crate::error::SyncResult;

// =============================================================================
// Wire Types
// =============================================================================

/// Site settings, as returned by `settings/site/`.
///
/// Opaque to this crate apart from serving as the check payload and being
/// handed to report formatters.
pub type SiteSettings = Value;

/// Identifiers of everything a branch should hold locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkIds {
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
    #[serde(default)]
    pub branch_product_ids: Vec<i64>,
}

impl BulkIds {
    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty() && self.branch_product_ids.is_empty()
    }
}

/// Full bootstrap snapshot for a branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkSnapshot {
    #[serde(default)]
    pub products: Vec<Value>,
    #[serde(default)]
    pub branch_products: Vec<Value>,
    /// Anything else the server bundles (tags, types, settings...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One rendered report, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    /// Source record id, when the record carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Value>,
    pub content: String,
}

/// A bulk-write batch: every artifact of one report kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBatch {
    pub batch_id: String,
    pub kind: ReportKind,
    pub branch_id: Option<BranchId>,
    pub generated_at: DateTime<Utc>,
    pub artifacts: Vec<ReportArtifact>,
}

/// Body of `sync/confirm/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub ids: Vec<String>,
}

/// List endpoints answer either with a bare array or a page envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> ListResponse<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Paged(page) => page.results,
            ListResponse::Plain(items) => items,
        }
    }
}

// =============================================================================
// Branch API Trait
// =============================================================================

/// REST operations used by this crate.
///
/// Every call is parameterised by the base URL it targets.
#[async_trait]
pub trait BranchApi: Send + Sync {
    /// `GET settings/site/`. Doubles as the connectivity check.
    async fn fetch_site_settings(&self, base: &str) -> SyncResult<SiteSettings>;

    /// `POST connectivity-logs/`.
    async fn create_connectivity_log(&self, base: &str, entry: &ConnectivityLogEntry) -> SyncResult<()>;

    /// `GET product-sync-status/`.
    async fn list_product_sync_status(
        &self,
        base: &str,
        query: &SyncStatusQuery,
    ) -> SyncResult<Page<SyncStatusRecord>>;

    /// `POST sync/confirm/` with the identifiers to confirm.
    async fn confirm_sync(&self, base: &str, ids: &[String]) -> SyncResult<()>;

    /// `GET bulk/initialize/`.
    async fn bulk_initialize(&self, base: &str, scope: &BulkScope) -> SyncResult<BulkSnapshot>;

    /// `GET bulk/initialize-ids/`.
    async fn bulk_initialize_ids(&self, base: &str, scope: &BulkScope) -> SyncResult<BulkIds>;

    /// `GET transactions/`, `reports/x-read/` or `reports/z-read/`.
    async fn list_reports(
        &self,
        base: &str,
        kind: ReportKind,
        range: &TimeRange,
        branch_id: Option<BranchId>,
    ) -> SyncResult<Vec<Value>>;

    /// `POST bulk/export/`.
    async fn submit_bulk_export(&self, base: &str, batch: &ExportBatch) -> SyncResult<()>;

    /// `GET <path>` for a plain listing (`products/`, `offline/tags/`...).
    async fn list(&self, base: &str, path: &str, params: &QueryParams) -> SyncResult<Vec<Value>>;
}

/// Path of each report source.
pub fn report_path(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Transactions => "transactions/",
        ReportKind::XRead => "reports/x-read/",
        ReportKind::ZRead => "reports/z-read/",
    }
}
