//! # Project Lifecycle State Machine
//!
//! Eight states, runtime-checked transitions. The machine is the single
//! source of truth for lifecycle legality: the persistence layer calls
//! [`validate_transition`] inside the same transaction that writes the
//! state, and the controller calls it again up front for early rejection.
//!
//! ## States and transitions
//!
//! ```text
//! draft ──────────────▶ forward_planning
//!   │                         │
//!   └────────▶ pending_approval ◀────────┘
//!                   │        │
//!            approved      rejected (terminal)
//!               │    │
//!       in_progress  cancelled (terminal)
//!               │
//!           completed (terminal)
//! ```
//!
//! Anything not in the table fails with [`TransitionError::InvalidTransition`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use exco_core::Error;

/// Lifecycle state of an excavation project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    /// Being drafted by the applicant; freely editable.
    Draft,
    /// Long-horizon planning entry; editable, visible to coordinators.
    ForwardPlanning,
    /// Submitted and awaiting a coordinator decision.
    PendingApproval,
    /// Approved; work may begin on the start date.
    Approved,
    /// Excavation under way.
    InProgress,
    /// Work finished (terminal).
    Completed,
    /// Declined by a coordinator (terminal).
    Rejected,
    /// Withdrawn after approval (terminal).
    Cancelled,
}

/// All states, in lifecycle order. Used by exhaustive tests and by the
/// persistence layer to parse stored names.
pub const ALL_STATES: [ProjectState; 8] = [
    ProjectState::Draft,
    ProjectState::ForwardPlanning,
    ProjectState::PendingApproval,
    ProjectState::Approved,
    ProjectState::InProgress,
    ProjectState::Completed,
    ProjectState::Rejected,
    ProjectState::Cancelled,
];

impl ProjectState {
    /// Canonical wire/database name (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ForwardPlanning => "forward_planning",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the canonical name.
    pub fn parse(s: &str) -> Option<Self> {
        ALL_STATES.iter().copied().find(|state| state.as_str() == s)
    }

    /// States reachable from this one. Empty for terminal states.
    pub fn allowed_next(&self) -> &'static [ProjectState] {
        match self {
            Self::Draft => &[Self::ForwardPlanning, Self::PendingApproval],
            Self::ForwardPlanning => &[Self::PendingApproval],
            Self::PendingApproval => &[Self::Approved, Self::Rejected],
            Self::Approved => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::Completed],
            Self::Completed | Self::Rejected | Self::Cancelled => &[],
        }
    }

    /// Whether no further transitions exist.
    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Whether the applicant may still edit project attributes.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::ForwardPlanning)
    }

    /// Whether entering this state is a coordinator decision. Only
    /// municipal coordinators and regional admins may drive these.
    pub fn requires_coordinator(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the project state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The `(from, to)` pair is not in the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: ProjectState,
        /// Attempted target state.
        to: ProjectState,
    },
}

impl From<TransitionError> for Error {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { from, to } => Error::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            },
        }
    }
}

/// Validate a lifecycle transition against the table.
pub fn validate_transition(from: ProjectState, to: ProjectState) -> Result<(), TransitionError> {
    if from.allowed_next().contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ProjectState::*;

    /// The complete set of legal transitions. Anything else must fail.
    const LEGAL: [(ProjectState, ProjectState); 8] = [
        (Draft, ForwardPlanning),
        (Draft, PendingApproval),
        (ForwardPlanning, PendingApproval),
        (PendingApproval, Approved),
        (PendingApproval, Rejected),
        (Approved, InProgress),
        (Approved, Cancelled),
        (InProgress, Completed),
    ];

    #[test]
    fn every_legal_pair_validates() {
        for (from, to) in LEGAL {
            assert!(
                validate_transition(from, to).is_ok(),
                "{from} -> {to} should be legal"
            );
        }
    }

    #[test]
    fn every_other_pair_is_rejected() {
        for from in super::ALL_STATES {
            for to in super::ALL_STATES {
                if LEGAL.contains(&(from, to)) {
                    continue;
                }
                let err = validate_transition(from, to).unwrap_err();
                assert_eq!(err, TransitionError::InvalidTransition { from, to });
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for state in [Completed, Rejected, Cancelled] {
            assert!(state.is_terminal());
            assert!(state.allowed_next().is_empty());
        }
        for state in [Draft, ForwardPlanning, PendingApproval, Approved, InProgress] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn editable_states() {
        assert!(Draft.is_editable());
        assert!(ForwardPlanning.is_editable());
        for state in [PendingApproval, Approved, InProgress, Completed, Rejected, Cancelled] {
            assert!(!state.is_editable(), "{state} should not be editable");
        }
    }

    #[test]
    fn coordinator_gate_covers_decisions_only() {
        assert!(Approved.requires_coordinator());
        assert!(Rejected.requires_coordinator());
        for state in [Draft, ForwardPlanning, PendingApproval, InProgress, Completed, Cancelled] {
            assert!(!state.requires_coordinator());
        }
    }

    #[test]
    fn names_roundtrip() {
        for state in super::ALL_STATES {
            assert_eq!(ProjectState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ProjectState::parse("DRAFT"), None);
        assert_eq!(ProjectState::parse("unknown"), None);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        for state in super::ALL_STATES {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            let back: ProjectState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
    }

    #[test]
    fn draft_cannot_jump_to_completed() {
        let err = validate_transition(Draft, Completed).unwrap_err();
        let core: exco_core::Error = err.into();
        assert_eq!(core.to_string(), "invalid transition from draft to completed");
    }

    #[test]
    fn cancelled_only_reachable_from_approved() {
        for from in super::ALL_STATES {
            let legal = from == Approved;
            assert_eq!(validate_transition(from, Cancelled).is_ok(), legal, "from {from}");
        }
    }

    fn any_state() -> impl Strategy<Value = ProjectState> {
        prop::sample::select(super::ALL_STATES.to_vec())
    }

    proptest! {
        #[test]
        fn validation_agrees_with_allowed_next(from in any_state(), to in any_state()) {
            let listed = from.allowed_next().contains(&to);
            prop_assert_eq!(validate_transition(from, to).is_ok(), listed);
        }

        #[test]
        fn no_transition_leaves_a_terminal_state(from in any_state(), to in any_state()) {
            if from.is_terminal() {
                prop_assert!(validate_transition(from, to).is_err());
            }
        }
    }
}
