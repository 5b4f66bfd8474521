//! # Bulk Initializer / Exporter
//!
//! One-shot, user-initiated bulk operations. Failures are returned to the
//! caller; nothing here retries.
//!
//! ## Export Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   export_reports(range)                                                 │
//! │        │                                                                │
//! │        ├──► GET <local>/transactions/     ─┐                            │
//! │        ├──► GET <local>/reports/x-read/   ─┼─ try_join!, all or nothing │
//! │        └──► GET <local>/reports/z-read/   ─┘                            │
//! │                          │                                              │
//! │                          ▼                                              │
//! │        ReportFormatter::format(kind, record, settings) per record       │
//! │                          │                                              │
//! │                          ▼                                              │
//! │        one ExportBatch per non-empty kind                               │
//! │        POST <authoritative>/bulk/export/                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use branchlink_core::{BranchId, BulkScope, ReportKind, TimeRange};

use crate::api::{BranchApi, BulkIds, BulkSnapshot, ExportBatch, ReportArtifact, SiteSettings};
use crate::config::NodeConfig;
use crate::error::SyncResult;

// =============================================================================
// Report Formatter
// =============================================================================

/// Renders one report record as flat text.
///
/// Implemented by the host's printing/report layer.
pub trait ReportFormatter: Send + Sync {
    fn format(&self, kind: ReportKind, record: &Value, settings: &SiteSettings) -> String;
}

/// Formats a record as `key: value` lines, preceded by the site name when
/// the settings carry one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextFormatter;

impl ReportFormatter for PlainTextFormatter {
    fn format(&self, kind: ReportKind, record: &Value, settings: &SiteSettings) -> String {
        let mut out = String::new();

        if let Some(name) = settings.get("site_name").and_then(Value::as_str) {
            out.push_str(name);
            out.push('\n');
        }
        out.push_str(&format!("{}\n", kind));

        match record {
            Value::Object(fields) => {
                for (key, value) in fields {
                    match value {
                        Value::String(s) => out.push_str(&format!("{}: {}\n", key, s)),
                        other => out.push_str(&format!("{}: {}\n", key, other)),
                    }
                }
            }
            other => out.push_str(&format!("{}\n", other)),
        }
        out
    }
}

// =============================================================================
// Export Summary
// =============================================================================

/// A batch that was accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBatch {
    pub kind: ReportKind,
    pub batch_id: String,
    pub artifacts: usize,
}

/// What [`BulkService::export_reports`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub batches: Vec<SubmittedBatch>,
}

impl ExportSummary {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn total_artifacts(&self) -> usize {
        self.batches.iter().map(|b| b.artifacts).sum()
    }
}

// =============================================================================
// Bulk Service
// =============================================================================

/// Bulk snapshot reads and report export for one node.
#[derive(Clone)]
pub struct BulkService {
    local: String,
    authoritative: String,
    branch_id: Option<BranchId>,
    api: Arc<dyn BranchApi>,
}

impl BulkService {
    /// Requires a local API. The authoritative side is the online API, or
    /// the local one on standalone nodes.
    pub fn for_node(config: &NodeConfig, api: Arc<dyn BranchApi>) -> Option<Self> {
        let resolver = config.resolver();
        let local = resolver.resolve_local()?.to_string();
        let authoritative = resolver
            .resolve_online()
            .map(str::to_string)
            .unwrap_or_else(|| local.clone());

        Some(BulkService {
            local,
            authoritative,
            branch_id: config.identity.local_branch_id,
            api,
        })
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    /// Scope for this node's own branch.
    pub fn default_scope(&self) -> BulkScope {
        BulkScope {
            branch_id: self.branch_id,
            ..Default::default()
        }
    }

    /// Full snapshot from the authoritative store. Read-only.
    pub async fn initialize(&self, scope: &BulkScope) -> SyncResult<BulkSnapshot> {
        let snapshot = self
            .api
            .bulk_initialize(&self.authoritative, scope)
            .await
            .map_err(|e| {
                error!(error = %e, branch_id = ?scope.branch_id, "Bulk initialize failed");
                e
            })?;

        info!(
            branch_id = ?scope.branch_id,
            products = snapshot.products.len(),
            branch_products = snapshot.branch_products.len(),
            "Bulk snapshot fetched"
        );
        Ok(snapshot)
    }

    /// Identifiers only, for detecting what is missing locally.
    pub async fn initialize_ids(&self, scope: &BulkScope) -> SyncResult<BulkIds> {
        let ids = self
            .api
            .bulk_initialize_ids(&self.authoritative, scope)
            .await
            .map_err(|e| {
                error!(error = %e, branch_id = ?scope.branch_id, "Bulk initialize-ids failed");
                e
            })?;

        debug!(
            products = ids.product_ids.len(),
            branch_products = ids.branch_product_ids.len(),
            "Bulk ids fetched"
        );
        Ok(ids)
    }

    /// Exports transactions, X-reads and Z-reads for `range`.
    ///
    /// The three sources are fetched concurrently and formatting starts only
    /// once all of them have answered. Kinds with no records produce no
    /// batch. A failed submit stops the export; batches already accepted
    /// stay accepted.
    pub async fn export_reports(
        &self,
        range: &TimeRange,
        formatter: &dyn ReportFormatter,
        settings: &SiteSettings,
    ) -> SyncResult<ExportSummary> {
        let (transactions, x_reads, z_reads) = tokio::try_join!(
            self.api.list_reports(&self.local, ReportKind::Transactions, range, self.branch_id),
            self.api.list_reports(&self.local, ReportKind::XRead, range, self.branch_id),
            self.api.list_reports(&self.local, ReportKind::ZRead, range, self.branch_id),
        )
        .map_err(|e| {
            error!(error = %e, range = %range.to_param(), "Report fetch failed");
            e
        })?;

        let mut summary = ExportSummary::default();

        for (kind, records) in [
            (ReportKind::Transactions, transactions),
            (ReportKind::XRead, x_reads),
            (ReportKind::ZRead, z_reads),
        ] {
            if records.is_empty() {
                debug!(%kind, "No records, skipping batch");
                continue;
            }

            let batch = self.build_batch(kind, &records, formatter, settings);
            let submitted = SubmittedBatch {
                kind,
                batch_id: batch.batch_id.clone(),
                artifacts: batch.artifacts.len(),
            };

            self.api
                .submit_bulk_export(&self.authoritative, &batch)
                .await
                .map_err(|e| {
                    error!(error = %e, %kind, batch_id = %batch.batch_id, "Bulk export submit failed");
                    e
                })?;

            info!(%kind, batch_id = %submitted.batch_id, artifacts = submitted.artifacts, "Export batch submitted");
            summary.batches.push(submitted);
        }

        Ok(summary)
    }

    fn build_batch(
        &self,
        kind: ReportKind,
        records: &[Value],
        formatter: &dyn ReportFormatter,
        settings: &SiteSettings,
    ) -> ExportBatch {
        let artifacts = records
            .iter()
            .map(|record| ReportArtifact {
                source_id: record.get("id").cloned(),
                content: formatter.format(kind, record, settings),
            })
            .collect();

        ExportBatch {
            batch_id: Uuid::new_v4().to_string(),
            kind,
            branch_id: self.branch_id,
            generated_at: Utc::now(),
            artifacts,
        }
    }
}
