//! # HTTP Transport
//!
//! `reqwest` implementation of [`BranchApi`].
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   base "http://10.0.0.5:8000/api"  +  path "settings/site/"             │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │   GET http://10.0.0.5:8000/api/settings/site/?page=1&page_size=50       │
//! │                     │                                                   │
//! │         ┌───────────┼─────────────────┬──────────────────┐              │
//! │         ▼           ▼                 ▼                  ▼              │
//! │       2xx         non-2xx          timeout          connect error       │
//! │     decode JSON   HttpStatus       Timeout(secs)    ConnectionFailed    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The client-wide timeout is the only timeout; there is no per-request
//! override.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use branchlink_core::{
    BranchId, BulkScope, ConnectivityLogEntry, Page, QueryParams, ReportKind, SyncStatusQuery,
    SyncStatusRecord, TimeRange,
};

use crate::api::{
    report_path, BranchApi, BulkIds, BulkSnapshot, ConfirmRequest, ExportBatch, ListResponse,
    SiteSettings,
};
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Paths
// =============================================================================

pub mod paths {
    pub const SITE_SETTINGS: &str = "settings/site/";
    pub const CONNECTIVITY_LOGS: &str = "connectivity-logs/";
    pub const PRODUCT_SYNC_STATUS: &str = "product-sync-status/";
    pub const SYNC_CONFIRM: &str = "sync/confirm/";
    pub const BULK_INITIALIZE: &str = "bulk/initialize/";
    pub const BULK_INITIALIZE_IDS: &str = "bulk/initialize-ids/";
    pub const BULK_EXPORT: &str = "bulk/export/";
    pub const PRODUCTS: &str = "products/";
    pub const BRANCH_PRODUCTS: &str = "branch-products/";
    pub const TAGS: &str = "tags/";
    pub const TYPES: &str = "types/";
}

// =============================================================================
// HTTP Branch API
// =============================================================================

/// REST client for the branch and head-office APIs.
#[derive(Debug, Clone)]
pub struct HttpBranchApi {
    client: Client,
    timeout: Duration,
}

impl HttpBranchApi {
    /// Creates a client whose every request times out after `timeout`.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("branchlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpBranchApi { client, timeout })
    }

    pub fn from_settings(settings: &SyncSettings) -> SyncResult<Self> {
        Self::new(settings.request_timeout())
    }

    /// Joins a base URL and a relative path, tolerating a trailing slash on
    /// either side.
    pub fn endpoint(base: &str, path: &str) -> SyncResult<Url> {
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    fn classify(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            SyncError::from(err)
        }
    }

    fn check(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(SyncError::HttpStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        params: &[(&'static str, String)],
    ) -> SyncResult<T> {
        let url = Self::endpoint(base, path)?;
        debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Self::check(response)?
            .json::<T>()
            .await
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }

    async fn post_json<B: Serialize + ?Sized>(&self, base: &str, path: &str, body: &B) -> SyncResult<()> {
        let url = Self::endpoint(base, path)?;
        debug!(%url, "POST");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Self::check(response)?;
        Ok(())
    }
}

#[async_trait]
impl BranchApi for HttpBranchApi {
    async fn fetch_site_settings(&self, base: &str) -> SyncResult<SiteSettings> {
        self.get_json(base, paths::SITE_SETTINGS, &[]).await
    }

    async fn create_connectivity_log(&self, base: &str, entry: &ConnectivityLogEntry) -> SyncResult<()> {
        self.post_json(base, paths::CONNECTIVITY_LOGS, entry).await
    }

    async fn list_product_sync_status(
        &self,
        base: &str,
        query: &SyncStatusQuery,
    ) -> SyncResult<Page<SyncStatusRecord>> {
        let mut page: Page<SyncStatusRecord> = self
            .get_json(base, paths::PRODUCT_SYNC_STATUS, &query.to_params())
            .await?;

        // The envelope carries only the total; paging comes from the request.
        page.page = query.page;
        page.page_size = query.page_size;
        Ok(page)
    }

    async fn confirm_sync(&self, base: &str, ids: &[String]) -> SyncResult<()> {
        let body = ConfirmRequest { ids: ids.to_vec() };
        self.post_json(base, paths::SYNC_CONFIRM, &body).await
    }

    async fn bulk_initialize(&self, base: &str, scope: &BulkScope) -> SyncResult<BulkSnapshot> {
        self.get_json(base, paths::BULK_INITIALIZE, &scope.to_params()).await
    }

    async fn bulk_initialize_ids(&self, base: &str, scope: &BulkScope) -> SyncResult<BulkIds> {
        self.get_json(base, paths::BULK_INITIALIZE_IDS, &scope.to_params()).await
    }

    async fn list_reports(
        &self,
        base: &str,
        kind: ReportKind,
        range: &TimeRange,
        branch_id: Option<BranchId>,
    ) -> SyncResult<Vec<Value>> {
        let response: ListResponse<Value> = self
            .get_json(base, report_path(kind), &range.to_params(branch_id))
            .await?;
        Ok(response.into_vec())
    }

    async fn submit_bulk_export(&self, base: &str, batch: &ExportBatch) -> SyncResult<()> {
        self.post_json(base, paths::BULK_EXPORT, batch).await
    }

    async fn list(&self, base: &str, path: &str, params: &QueryParams) -> SyncResult<Vec<Value>> {
        let response: ListResponse<Value> = self.get_json(base, path, params).await?;
        Ok(response.into_vec())
    }
}
