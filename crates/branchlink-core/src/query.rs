//! # Queries and Pagination
//!
//! Typed request parameters and the paginated response envelope shared by
//! the branch and head-office APIs.
//!
//! ## Stable Paging
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  page=1 page_size=50 ordering=branch_id,product_id  → rows 1..50        │
//! │  page=2 page_size=50 ordering=branch_id,product_id  → rows 51..100      │
//! │                                                                         │
//! │  Every listing query carries an explicit ordering, so the same filter   │
//! │  set and page number always address the same slice (barring writes).  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{BranchId, ProductId};
use crate::validation::{validate_page, validate_page_size, validate_time_range, ValidationResult};

/// Query string pairs, in the order they are sent.
pub type QueryParams = Vec<(&'static str, String)>;

/// Ordering applied to sync-status listings.
pub const SYNC_STATUS_ORDERING: &str = "branch_id,product_id";

const DEFAULT_PAGE_SIZE: u32 = 50;

// =============================================================================
// Page
// =============================================================================

/// One page of a listing plus the metadata needed to walk the rest.
///
/// The APIs report the grand total as `count`; `page`/`page_size` are not
/// echoed back and are filled in from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page<T> {
    #[serde(alias = "count")]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        Page {
            total,
            page,
            page_size,
            results,
        }
    }

    /// Number of pages at the current page size.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Maps the rows, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

// =============================================================================
// Sync Status Query
// =============================================================================

/// Filter and page selection for the product sync-status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatusQuery {
    pub branch_id: Option<BranchId>,
    pub product_id: Option<ProductId>,
    pub out_of_sync_only: bool,
    pub page: u32,
    pub page_size: u32,
}

impl Default for SyncStatusQuery {
    fn default() -> Self {
        SyncStatusQuery {
            branch_id: None,
            product_id: None,
            out_of_sync_only: false,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SyncStatusQuery {
    pub fn for_branch(branch_id: BranchId) -> Self {
        SyncStatusQuery {
            branch_id: Some(branch_id),
            ..Default::default()
        }
    }

    pub fn out_of_sync_only(mut self) -> Self {
        self.out_of_sync_only = true;
        self
    }

    pub fn with_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// The same filters, one page further.
    pub fn next_page(&self) -> Self {
        SyncStatusQuery {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn validate(&self, max_page_size: u32) -> ValidationResult<()> {
        validate_page(self.page)?;
        validate_page_size(self.page_size, max_page_size)
    }

    /// Query string pairs. Unset filters are omitted rather than sent empty.
    pub fn to_params(&self) -> QueryParams {
        let mut params: QueryParams = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
            ("ordering", SYNC_STATUS_ORDERING.to_string()),
        ];
        if let Some(branch_id) = self.branch_id {
            params.push(("branch_id", branch_id.to_string()));
        }
        if let Some(product_id) = self.product_id {
            params.push(("product_id", product_id.to_string()));
        }
        if self.out_of_sync_only {
            params.push(("out_of_sync_only", "true".to_string()));
        }
        params
    }
}

// =============================================================================
// Time Range
// =============================================================================

/// A report window, inclusive of `start`, exclusive of `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Builds a window, rejecting one whose end precedes its start.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ValidationResult<Self> {
        validate_time_range(start, end)?;
        Ok(TimeRange { start, end })
    }

    /// `time_range` wire value: `<start>,<end>` in RFC 3339.
    pub fn to_param(&self) -> String {
        format!(
            "{},{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    pub fn to_params(&self, branch_id: Option<BranchId>) -> QueryParams {
        let mut params: QueryParams = vec![("time_range", self.to_param())];
        if let Some(branch_id) = branch_id {
            params.push(("branch_id", branch_id.to_string()));
        }
        params
    }
}

// =============================================================================
// Bulk Scope
// =============================================================================

/// What a bulk initialize call should cover.
///
/// Empty ID lists mean "everything for the branch".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkScope {
    pub branch_id: Option<BranchId>,
    pub product_ids: Vec<ProductId>,
    pub branch_product_ids: Vec<i64>,
}

impl BulkScope {
    pub fn for_branch(branch_id: BranchId) -> Self {
        BulkScope {
            branch_id: Some(branch_id),
            ..Default::default()
        }
    }

    pub fn with_products(mut self, ids: impl IntoIterator<Item = ProductId>) -> Self {
        self.product_ids.extend(ids);
        self
    }

    pub fn with_branch_products(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.branch_product_ids.extend(ids);
        self
    }

    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        if let Some(branch_id) = self.branch_id {
            params.push(("branch_id", branch_id.to_string()));
        }
        if !self.product_ids.is_empty() {
            params.push(("product_ids", join_ids(&self.product_ids)));
        }
        if !self.branch_product_ids.is_empty() {
            params.push(("branch_product_ids", join_ids(&self.branch_product_ids)));
        }
        params
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}
