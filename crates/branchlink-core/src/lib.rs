//! # branchlink-core: Pure Rules for Branch/Head-Office Sync
//!
//! This crate holds the decision logic of BranchLink as pure functions with
//! zero I/O dependencies. Everything that touches the network, a timer or
//! the disk lives in `branchlink-sync`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BranchLink Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Host (apps/branch-agent, UI shell)              │   │
//! │  │     connectivity badge • out-of-sync list • queue size          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    branchlink-sync                              │   │
//! │  │   monitor • reconciler • queue • bulk • HTTP client • config    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ "where do I send this?"               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ branchlink-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌──────────────┐  ┌───────────┐  ┌─────────┐  │   │
//! │  │   │  routing  │  │ connectivity │  │   types   │  │  query  │  │   │
//! │  │   │ Resolver  │  │ state machine│  │  records  │  │  pages  │  │   │
//! │  │   └───────────┘  └──────────────┘  └───────────┘  └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TIMERS • NO NETWORK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Node identity, endpoints, sync-status records
//! - [`routing`] - Endpoint resolution and enablement rules
//! - [`connectivity`] - Check classification and transitions
//! - [`query`] - Filters, time windows, pagination envelope
//! - [`money`] - Fixed-point prices for exact drift comparison
//! - [`validation`] - Input checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use branchlink_core::{EndpointResolver, EndpointSet, HeadOfficeRole, NodeIdentity};
//!
//! let resolver = EndpointResolver::new(
//!     NodeIdentity::head_office(HeadOfficeRole::Test),
//!     EndpointSet::new(Some("http://127.0.0.1:8000/api"), Some("https://ho.example.com/api")),
//! );
//!
//! // A TEST head office never leaves the building.
//! assert_eq!(resolver.resolve_online(), resolver.resolve_local());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod connectivity;
pub mod error;
pub mod money;
pub mod query;
pub mod routing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use connectivity::{ConnectivityLogEntry, ConnectivityPhase, ConnectivityState, CheckOutcome, TransitionType};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use query::{BulkScope, Page, QueryParams, SyncStatusQuery, TimeRange};
pub use routing::EndpointResolver;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Check interval of the presence monitor that drives the UI badge.
pub const PRESENCE_INTERVAL_MS: u64 = 5_000;

/// Check interval of the head-office ping used for read routing.
pub const HEAD_OFFICE_PING_INTERVAL_MS: u64 = 10_000;

/// Delay before a failed queue drain is retried.
pub const SYNC_RETRY_DELAY_MS: u64 = 5_000;
