//! # Connectivity State Machine
//!
//! Pure classification of check outcomes into connectivity transitions.
//! The polling loop lives in `branchlink-sync::monitor`; this module only
//! decides what a check result *means*.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │                 ┌─────────┐                                             │
//! │                 │ UNKNOWN │   (process start)                           │
//! │                 └────┬────┘                                             │
//! │          reachable   │   unreachable                                    │
//! │        (no event)    │   (no event)                                     │
//! │            ┌─────────┴─────────┐                                        │
//! │            ▼                   ▼                                        │
//! │      ┌──────────┐  unreachable ┌──────────┐                            │
//! │      │  ONLINE  │ ───────────► │ OFFLINE  │                            │
//! │      │          │ ◄─────────── │          │                            │
//! │      └──────────┘  reachable   └──────────┘                            │
//! │                                                                         │
//! │  ONLINE → OFFLINE emits ONLINE_TO_OFFLINE                              │
//! │  OFFLINE → ONLINE emits OFFLINE_TO_ONLINE                              │
//! │  Repeated identical outcomes emit nothing.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::BranchId;

// =============================================================================
// Check Outcome
// =============================================================================

/// Classified result of one check.
///
/// Any successful response is `Reachable`; network failure, non-2xx and
/// timeout are all `Unreachable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Reachable,
    Unreachable,
}

impl CheckOutcome {
    /// Maps a check result to an outcome without inspecting the error.
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            CheckOutcome::Reachable
        } else {
            CheckOutcome::Unreachable
        }
    }

    fn is_connected(self) -> bool {
        self == CheckOutcome::Reachable
    }
}

// =============================================================================
// Transition Type
// =============================================================================

/// Direction of a detected connectivity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionType {
    OfflineToOnline,
    OnlineToOffline,
}

impl std::fmt::Display for TransitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionType::OfflineToOnline => write!(f, "OFFLINE_TO_ONLINE"),
            TransitionType::OnlineToOffline => write!(f, "ONLINE_TO_OFFLINE"),
        }
    }
}

// =============================================================================
// Connectivity State
// =============================================================================

/// Coarse phase of a [`ConnectivityState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityPhase {
    Unknown,
    Online,
    Offline,
}

/// Connectivity of one monitored endpoint.
///
/// Created "unknown" at process start; mutated only by its monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    /// `None` until the first check resolves.
    pub is_connected: Option<bool>,
    pub last_transition_type: Option<TransitionType>,
    #[ts(as = "Option<String>")]
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl ConnectivityState {
    /// The state before any check has resolved.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConnectivityPhase {
        match self.is_connected {
            None => ConnectivityPhase::Unknown,
            Some(true) => ConnectivityPhase::Online,
            Some(false) => ConnectivityPhase::Offline,
        }
    }

    /// Returns true only when the last check succeeded.
    ///
    /// Unknown counts as offline for display purposes.
    pub fn is_online(&self) -> bool {
        self.is_connected == Some(true)
    }

    /// Applies a check outcome.
    ///
    /// Returns the transition when the classification changed from the
    /// previous *resolved* classification. The first resolved check updates
    /// the state but never reports a transition.
    pub fn observe(&mut self, outcome: CheckOutcome, at: DateTime<Utc>) -> Option<TransitionType> {
        let now_connected = outcome.is_connected();
        let previous = self.is_connected.replace(now_connected);

        let transition = match previous {
            Some(false) if now_connected => TransitionType::OfflineToOnline,
            Some(true) if !now_connected => TransitionType::OnlineToOffline,
            _ => return None,
        };

        self.last_transition_type = Some(transition);
        self.last_transition_at = Some(at);
        Some(transition)
    }
}

// =============================================================================
// Connectivity Log Entry
// =============================================================================

/// Append-only audit record, written once per detected transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityLogEntry {
    pub branch_id: Option<BranchId>,
    pub transition_type: TransitionType,
    pub timestamp: DateTime<Utc>,
}

impl ConnectivityLogEntry {
    pub fn new(branch_id: Option<BranchId>, transition_type: TransitionType, timestamp: DateTime<Utc>) -> Self {
        ConnectivityLogEntry {
            branch_id,
            transition_type,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CheckOutcome::{Reachable as Up, Unreachable as Down};

    fn run(seq: &[CheckOutcome]) -> Vec<TransitionType> {
        let mut state = ConnectivityState::unknown();
        seq.iter()
            .filter_map(|o| state.observe(*o, Utc::now()))
            .collect()
    }

    #[test]
    fn test_first_check_is_not_a_transition() {
        assert!(run(&[Up]).is_empty());
        assert!(run(&[Down]).is_empty());
    }

    #[test]
    fn test_fail_fail_ok_fail() {
        assert_eq!(
            run(&[Down, Down, Up, Down]),
            vec![TransitionType::OfflineToOnline, TransitionType::OnlineToOffline]
        );
    }

    #[test]
    fn test_ok_ok_fail() {
        assert_eq!(run(&[Up, Up, Down]), vec![TransitionType::OnlineToOffline]);
    }

    #[test]
    fn test_phase_follows_last_check() {
        let mut state = ConnectivityState::unknown();
        assert_eq!(state.phase(), ConnectivityPhase::Unknown);
        assert!(!state.is_online());

        state.observe(Up, Utc::now());
        assert_eq!(state.phase(), ConnectivityPhase::Online);
        assert!(state.is_online());
        assert_eq!(state.last_transition_type, None);

        state.observe(Down, Utc::now());
        assert_eq!(state.phase(), ConnectivityPhase::Offline);
        assert_eq!(state.last_transition_type, Some(TransitionType::OnlineToOffline));
        assert!(state.last_transition_at.is_some());
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<(), ()> = Ok(());
        let err: Result<(), ()> = Err(());
        assert_eq!(CheckOutcome::from_result(&ok), CheckOutcome::Reachable);
        assert_eq!(CheckOutcome::from_result(&err), CheckOutcome::Unreachable);
    }

    #[test]
    fn test_transition_wire_name() {
        let json = serde_json::to_string(&TransitionType::OfflineToOnline).unwrap();
        assert_eq!(json, "\"OFFLINE_TO_ONLINE\"");
    }
}
