//! # Domain Types
//!
//! Core domain types shared by every BranchLink component.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │  NodeIdentity   │   │   EndpointSet   │   │  SyncStatusRecord   │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  app_type       │   │  local_url      │   │  branch_id          │   │
//! │  │  head_office_   │   │  online_url     │   │  product_id         │   │
//! │  │    role         │   └─────────────────┘   │  expected / current │   │
//! │  │  standalone     │                         │  is_synced          │   │
//! │  │  local_branch_id│   ┌─────────────────┐   └─────────────────────┘   │
//! │  └─────────────────┘   │ PendingSyncItem │                             │
//! │                        │  key, attempts  │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `NodeIdentity` and `EndpointSet` are loaded once at startup and are
//! immutable for the lifetime of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

/// Branch identifier as assigned by head office.
pub type BranchId = i64;

/// Product identifier as assigned by head office.
pub type ProductId = i64;

// =============================================================================
// App Type
// =============================================================================

/// What kind of installation this process is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppType {
    /// Back-office tooling; never monitors connectivity.
    BackOffice,
    /// A store-level server with its own local database.
    Branch,
    /// The authoritative aggregation node.
    HeadOffice,
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppType::BackOffice => write!(f, "BACK_OFFICE"),
            AppType::Branch => write!(f, "BRANCH"),
            AppType::HeadOffice => write!(f, "HEAD_OFFICE"),
        }
    }
}

impl std::str::FromStr for AppType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "BACK_OFFICE" | "BACKOFFICE" => Ok(AppType::BackOffice),
            "BRANCH" => Ok(AppType::Branch),
            "HEAD_OFFICE" | "HEADOFFICE" => Ok(AppType::HeadOffice),
            _ => Err(CoreError::UnknownValue {
                key: "app_type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Head Office Role
// =============================================================================

/// Role of a head-office installation.
///
/// Only meaningful when `app_type == HeadOffice`; other nodes carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeadOfficeRole {
    /// The main head office; its online endpoint is a distinct server.
    Main,
    /// A relay head office whose "online" endpoint is itself.
    NotMain,
    /// Sandbox: online calls are short-circuited to the local API.
    Test,
}

impl std::fmt::Display for HeadOfficeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadOfficeRole::Main => write!(f, "MAIN"),
            HeadOfficeRole::NotMain => write!(f, "NOT_MAIN"),
            HeadOfficeRole::Test => write!(f, "TEST"),
        }
    }
}

impl std::str::FromStr for HeadOfficeRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "MAIN" => Ok(HeadOfficeRole::Main),
            "NOT_MAIN" | "NOTMAIN" => Ok(HeadOfficeRole::NotMain),
            "TEST" => Ok(HeadOfficeRole::Test),
            _ => Err(CoreError::UnknownValue {
                key: "head_office_role".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Node Identity
// =============================================================================

/// Who this node is. Drives every routing decision.
///
/// ## Invariant
/// `standalone == true` implies no online endpoint is ever contacted. The
/// resolver enforces this; see [`crate::routing::EndpointResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub app_type: AppType,
    pub head_office_role: Option<HeadOfficeRole>,
    pub standalone: bool,
    pub local_branch_id: Option<BranchId>,
}

impl NodeIdentity {
    /// Identity of a plain, connected branch server.
    pub fn branch(branch_id: BranchId) -> Self {
        NodeIdentity {
            app_type: AppType::Branch,
            head_office_role: None,
            standalone: false,
            local_branch_id: Some(branch_id),
        }
    }

    /// Identity of a head office with the given role.
    pub fn head_office(role: HeadOfficeRole) -> Self {
        NodeIdentity {
            app_type: AppType::HeadOffice,
            head_office_role: Some(role),
            standalone: false,
            local_branch_id: None,
        }
    }

    /// Returns true for a head office.
    pub fn is_head_office(&self) -> bool {
        self.app_type == AppType::HeadOffice
    }

    /// Returns true when the sandbox short-circuit applies.
    pub fn is_test_role(&self) -> bool {
        self.head_office_role == Some(HeadOfficeRole::Test)
    }
}

impl Default for NodeIdentity {
    /// A connected back-office node, which runs no monitor and has no
    /// endpoints until some are configured.
    fn default() -> Self {
        NodeIdentity {
            app_type: AppType::BackOffice,
            head_office_role: None,
            standalone: false,
            local_branch_id: None,
        }
    }
}

// =============================================================================
// Endpoint Set
// =============================================================================

/// The configured base URLs, before routing rules are applied.
///
/// Empty or whitespace-only strings are normalised to `None`: an empty URL
/// means "not configured", never "an empty host".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    pub local_url: Option<String>,
    pub online_url: Option<String>,
}

impl EndpointSet {
    /// Builds an endpoint set, normalising blank values to `None`.
    pub fn new(local_url: Option<&str>, online_url: Option<&str>) -> Self {
        EndpointSet {
            local_url: normalize_url(local_url),
            online_url: normalize_url(online_url),
        }
    }

}

fn normalize_url(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
}

// =============================================================================
// Sync Status Record
// =============================================================================

/// One product at one branch, as reported by the authoritative store.
///
/// ## Invariant
/// `is_synced == (expected_price_per_piece == current_price_per_piece)`.
/// `is_synced` is computed upstream and never re-derived here; records that
/// break the invariant are exactly what the reconciler reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatusRecord {
    pub branch_id: BranchId,
    pub product_id: ProductId,
    /// Price held by the authoritative (online) source.
    #[ts(as = "String")]
    pub expected_price_per_piece: Money,
    /// Price held by the branch.
    #[ts(as = "String")]
    pub current_price_per_piece: Money,
    pub is_synced: bool,
    #[ts(as = "String")]
    pub last_reported_at: DateTime<Utc>,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub details: serde_json::Value,
}

impl SyncStatusRecord {
    /// Returns true when `is_synced` agrees with the two prices.
    pub fn is_consistent(&self) -> bool {
        self.is_synced == (self.expected_price_per_piece == self.current_price_per_piece)
    }

    /// Branch price minus authoritative price, or `None` if the difference
    /// does not fit.
    pub fn drift(&self) -> Option<Money> {
        self.current_price_per_piece
            .checked_sub(self.expected_price_per_piece)
    }
}

// =============================================================================
// Pending Sync Item
// =============================================================================

/// A locally-originated change that has not been confirmed upstream yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingSyncItem {
    pub key: String,
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,
    /// Failed drain attempts that included this item.
    pub attempts: u32,
}

impl PendingSyncItem {
    pub fn new(key: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        PendingSyncItem {
            key: key.into(),
            enqueued_at,
            attempts: 0,
        }
    }
}

// =============================================================================
// Report Kinds
// =============================================================================

/// The three sources the bulk exporter turns into artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Transactions,
    XRead,
    ZRead,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Transactions, ReportKind::XRead, ReportKind::ZRead];
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Transactions => write!(f, "transactions"),
            ReportKind::XRead => write!(f, "x_read"),
            ReportKind::ZRead => write!(f, "z_read"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(expected: i64, current: i64, is_synced: bool) -> SyncStatusRecord {
        SyncStatusRecord {
            branch_id: 3,
            product_id: 42,
            expected_price_per_piece: Money::from_cents(expected),
            current_price_per_piece: Money::from_cents(current),
            is_synced,
            last_reported_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            details: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_app_type_parsing() {
        assert_eq!("BRANCH".parse::<AppType>().unwrap(), AppType::Branch);
        assert_eq!("head_office".parse::<AppType>().unwrap(), AppType::HeadOffice);
        assert_eq!("back-office".parse::<AppType>().unwrap(), AppType::BackOffice);
        assert!("kiosk".parse::<AppType>().is_err());
    }

    #[test]
    fn test_head_office_role_parsing() {
        assert_eq!("MAIN".parse::<HeadOfficeRole>().unwrap(), HeadOfficeRole::Main);
        assert_eq!("not_main".parse::<HeadOfficeRole>().unwrap(), HeadOfficeRole::NotMain);
        assert_eq!("Test".parse::<HeadOfficeRole>().unwrap(), HeadOfficeRole::Test);
        assert!("primary".parse::<HeadOfficeRole>().is_err());
    }

    #[test]
    fn test_endpoint_set_normalizes_blank_urls() {
        let set = EndpointSet::new(Some("  "), Some("https://ho.example.com/api/"));
        assert_eq!(set.local_url, None);
        assert_eq!(set.online_url.as_deref(), Some("https://ho.example.com/api"));
    }

    #[test]
    fn test_default_identity_is_connected_back_office() {
        let identity = NodeIdentity::default();
        assert!(!identity.standalone);
        assert_eq!(identity.app_type, AppType::BackOffice);
        assert_eq!(identity.head_office_role, None);
    }

    #[test]
    fn test_record_consistency() {
        assert!(record(1250, 1250, true).is_consistent());
        assert!(record(1250, 1100, false).is_consistent());
        assert!(!record(1250, 1100, true).is_consistent());
        assert!(!record(1250, 1250, false).is_consistent());
    }

    #[test]
    fn test_record_drift() {
        assert_eq!(record(1250, 1100, false).drift().map(|d| d.cents()), Some(-150));
    }

    #[test]
    fn test_record_deserializes_api_payload() {
        let json = r#"{
            "branch_id": 3,
            "product_id": 42,
            "expected_price_per_piece": "12.50",
            "current_price_per_piece": 12.5,
            "is_synced": true,
            "last_reported_at": "2024-03-01T08:00:00Z"
        }"#;
        let parsed: SyncStatusRecord = serde_json::from_str(json).unwrap();
        assert!(parsed.is_consistent());
        assert_eq!(parsed.details, serde_json::Value::Null);
    }
}
