//! # Endpoint Resolution
//!
//! Decides, from the immutable node identity and configured endpoints,
//! which base URL an operation must target and which background
//! components are allowed to run.
//!
//! ## Resolution Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      resolve_online()                                   │
//! │                                                                         │
//! │   head_office_role == TEST ──────────► resolve_local()  (sandbox)       │
//! │            │ no                                                         │
//! │            ▼                                                            │
//! │   standalone ────────────────────────► None  (never contact online)     │
//! │            │ no                                                         │
//! │            ▼                                                            │
//! │   configured online_url (may be None, e.g. a NOT_MAIN head office)      │
//! │                                                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                      monitor_enabled()                                  │
//! │                                                                         │
//! │   !standalone                                                           │
//! │   && app_type != BACK_OFFICE                                            │
//! │   && !(app_type == HEAD_OFFICE && role == NOT_MAIN)   (self-loop)       │
//! │   && local url && online url                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution is pure: identical inputs always give identical outputs, and
//! both inputs are fixed for the lifetime of the process.

use crate::types::{AppType, EndpointSet, HeadOfficeRole, NodeIdentity};

/// Routes operations to the local branch API or the online API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResolver {
    identity: NodeIdentity,
    endpoints: EndpointSet,
}

impl EndpointResolver {
    pub fn new(identity: NodeIdentity, endpoints: EndpointSet) -> Self {
        EndpointResolver {
            identity,
            endpoints,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// The local branch API, if configured.
    pub fn resolve_local(&self) -> Option<&str> {
        self.endpoints.local_url.as_deref()
    }

    /// The online (head-office) API.
    ///
    /// For a TEST head office this is `resolve_local()` verbatim, including
    /// when that is `None`.
    pub fn resolve_online(&self) -> Option<&str> {
        if self.identity.is_test_role() {
            return self.resolve_local();
        }
        if self.identity.standalone {
            return None;
        }
        self.endpoints.online_url.as_deref()
    }

    /// Read routing driven by the head-office ping monitor.
    ///
    /// Reads go online while the online endpoint is known to be reachable
    /// and fall back to the local API otherwise (including while unknown).
    pub fn resolve_read(&self, is_connected: Option<bool>) -> Option<&str> {
        match is_connected {
            Some(true) => self.resolve_online().or_else(|| self.resolve_local()),
            _ => self.resolve_local(),
        }
    }

    /// Path prefix for listings mirrored by the local branch API.
    ///
    /// Connected nodes read the `offline/` copies; a standalone node serves
    /// the plain endpoints itself.
    pub fn listing_prefix(&self) -> &'static str {
        if self.identity.standalone {
            ""
        } else {
            "offline/"
        }
    }

    // =========================================================================
    // Enablement
    // =========================================================================

    /// Whether the connectivity monitor may run on this node.
    pub fn monitor_enabled(&self) -> bool {
        let identity = &self.identity;

        if identity.standalone || identity.app_type == AppType::BackOffice {
            return false;
        }
        // A NOT_MAIN head office's online endpoint is itself.
        if identity.app_type == AppType::HeadOffice
            && identity.head_office_role == Some(HeadOfficeRole::NotMain)
        {
            return false;
        }

        self.resolve_local().is_some() && self.resolve_online().is_some()
    }

    /// Whether the sync-status reconciler may run on this node.
    ///
    /// Only a connected head office with a local API has something to
    /// reconcile against.
    pub fn reconciler_enabled(&self) -> bool {
        self.identity.is_head_office() && !self.identity.standalone && self.resolve_local().is_some()
    }
}
