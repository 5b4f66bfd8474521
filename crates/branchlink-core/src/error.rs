//! # Error Types
//!
//! Domain-specific error types for branchlink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  branchlink-core errors (this file)                                    │
//! │  ├── CoreError        - Configuration values the rules cannot accept   │
//! │  └── ValidationError  - Field-level input check failures               │
//! │                                                                         │
//! │  branchlink-sync errors (separate crate)                               │
//! │  └── SyncError        - Config store, HTTP, background task failures   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries the offending key or value.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while interpreting node configuration.
///
/// A *missing* URL is never an error here: absence means "feature
/// disabled" and is modelled with `Option`. These variants cover values
/// that are present but cannot be understood.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration key holds a value outside its enum.
    ///
    /// ## When This Occurs
    /// - `app_type = "KIOSK"` (only BACK_OFFICE, BRANCH, HEAD_OFFICE exist)
    /// - `head_office_role = "SECONDARY"`
    #[error("Unknown value '{value}' for {key}")]
    UnknownValue { key: String, value: String },

    /// A boolean flag holds something other than true/false.
    #[error("Invalid boolean '{value}' for {key}")]
    InvalidFlag { key: String, value: String },

    /// A value failed an input check.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Field-level input check failures.
///
/// Raised before a request leaves the process, so a malformed page number
/// or URL never turns into a confusing server-side failure.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Missing or blank.
    #[error("{field} is required")]
    Required { field: String },

    /// Outside the accepted bounds.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., URL without scheme).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Time window whose end precedes its start.
    #[error("time range end {end} is before start {start}")]
    InvertedRange { start: String, end: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Result alias for this crate.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownValue {
            key: "app_type".to_string(),
            value: "KIOSK".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown value 'KIOSK' for app_type");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "branch_id".to_string(),
        };
        assert_eq!(err.to_string(), "branch_id is required");

        let err = ValidationError::OutOfRange {
            field: "page_size".to_string(),
            min: 1,
            max: 500,
        };
        assert_eq!(err.to_string(), "page_size must be between 1 and 500");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "local_api_url".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
