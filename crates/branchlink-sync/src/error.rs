//! # Sync Error Types
//!
//! Error types for connectivity, queue and bulk operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  SerializationFailed    │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  DeserializationFailed  │ │
//! │  │  ConfigLoad/Save│  │  HttpStatus     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Feature gating │  │    Internal     │  │      Core               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  FeatureDisabled│  │  ShuttingDown   │  │  CoreError (routing,    │ │
//! │  │                 │  │                 │  │  validation)            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monitor and queue failures never leave their component: they are logged
//! and folded into state. Reconciler and bulk failures are returned to the
//! caller as these values.

use branchlink_core::{CoreError, ValidationError};
use thiserror::Error;

/// Result of any fallible operation in this crate.
pub type SyncResult<T> = Result<T, SyncError>;

/// Everything that can go wrong talking to the branch and online APIs.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid node configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load the config store.
    #[error("Could not read node config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to persist the config store.
    #[error("Could not write node config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the server.
    #[error("Cannot reach server: {0}")]
    ConnectionFailed(String),

    /// Request did not complete within the transport timeout.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a request body.
    #[error("Could not encode request body: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a response body.
    #[error("Unreadable response body: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Feature Gating
    // =========================================================================
    /// The operation needs an endpoint this node does not have.
    ///
    /// ## When This Occurs
    /// - Listing sync status on a branch node
    /// - Exporting reports with no local API configured
    #[error("{0} is disabled for this node")]
    FeatureDisabled(&'static str),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Component is shutting down.
    #[error("Sync service is shutting down")]
    ShuttingDown,


    /// Routing or validation rule rejected the input.
    #[error(transparent)]
    Core(#[from] CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Core(CoreError::Validation(err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        // Timeouts are classified by the caller, which knows the limit.
        if err.is_decode() {
            return SyncError::DeserializationFailed(err.to_string());
        }
        SyncError::ConnectionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Classification
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt could succeed.
    ///
    /// ## Retryable Errors
    /// - Unreachable host
    /// - Timeouts
    /// - 5xx and 429 responses
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) => true,
            SyncError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Bad or unreadable node configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::Core(CoreError::UnknownValue { .. })
                | SyncError::Core(CoreError::InvalidFlag { .. })
        )
    }

    /// Returns true if the server answered with something we cannot read.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::SerializationFailed(_) | SyncError::DeserializationFailed(_)
        )
    }
}
