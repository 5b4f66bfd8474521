//! # Validation Module
//!
//! Input checks that run before a request leaves the process.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Config load (branchlink-sync::config)                        │
//! │  └── validate_base_url on every configured URL                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Query construction (THIS MODULE)                             │
//! │  ├── validate_page / validate_page_size                                │
//! │  └── validate_time_range                                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote API                                                   │
//! │  └── Server-side filters and permissions                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest page the APIs will serve.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 500;

// =============================================================================
// URL Validators
// =============================================================================

/// Validates a configured API base URL.
///
/// ## Rules
/// - Must not be empty
/// - Must use `http://` or `https://`
/// - Must name a host
///
/// Full parsing happens in the sync crate; this only rejects values that
/// can never be a base URL.
///
/// ## Example
/// ```rust
/// use branchlink_core::validation::validate_base_url;
///
/// assert!(validate_base_url("local_api_url", "http://10.0.0.5:8000/api").is_ok());
/// assert!(validate_base_url("local_api_url", "10.0.0.5:8000").is_err());
/// ```
pub fn validate_base_url(field: &str, url: &str) -> ValidationResult<()> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must start with http:// or https://".to_string(),
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.starts_with(':') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Pagination Validators
// =============================================================================

/// Validates a 1-based page number.
pub fn validate_page(page: u32) -> ValidationResult<()> {
    if page == 0 {
        return Err(ValidationError::OutOfRange {
            field: "page".to_string(),
            min: 1,
            max: i64::from(u32::MAX),
        });
    }

    Ok(())
}

/// Validates a page size against the configured ceiling.
pub fn validate_page_size(page_size: u32, max: u32) -> ValidationResult<()> {
    if page_size == 0 || page_size > max {
        return Err(ValidationError::OutOfRange {
            field: "page_size".to_string(),
            min: 1,
            max: i64::from(max),
        });
    }

    Ok(())
}

// =============================================================================
// Time Validators
// =============================================================================

/// Validates a report window.
///
/// An empty window (`start == end`) is allowed; it simply selects nothing.
pub fn validate_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> ValidationResult<()> {
    if end < start {
        return Err(ValidationError::InvertedRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }

    Ok(())
}
