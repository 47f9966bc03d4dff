//! Application status state machine.
//!
//! ```text
//! PENDING      → VALIDATING | CANCELLED
//! VALIDATING   → APPROVED | REJECTED | UNDER_REVIEW
//! UNDER_REVIEW → APPROVED | REJECTED
//! APPROVED, REJECTED, CANCELLED, COMPLETED are final.
//! ```
//!
//! Self-transitions are no-ops. Anything else is a `StateTransitionError`.

use crate::common::errors::AppError;
use crate::common::types::ApplicationStatus;

use ApplicationStatus::*;

/// Statuses with no outgoing transitions.
pub const FINAL_STATES: [ApplicationStatus; 4] = [Approved, Rejected, Cancelled, Completed];

pub fn is_final_state(status: ApplicationStatus) -> bool {
    FINAL_STATES.contains(&status)
}

pub fn allowed_transitions(status: ApplicationStatus) -> &'static [ApplicationStatus] {
    match status {
        Pending => &[Validating, Cancelled],
        Validating => &[Approved, Rejected, UnderReview],
        UnderReview => &[Approved, Rejected],
        Approved | Rejected | Cancelled | Completed => &[],
    }
}

/// Validate a transition. `Ok(())` for allowed moves and for no-op
/// self-transitions; `StateTransition` otherwise.
pub fn validate_transition(
    old_status: ApplicationStatus,
    new_status: ApplicationStatus,
) -> Result<(), AppError> {
    if old_status == new_status {
        return Ok(());
    }

    if is_final_state(old_status) {
        return Err(AppError::StateTransition(format!(
            "cannot change status from final state '{old_status}'"
        )));
    }

    let allowed = allowed_transitions(old_status);
    if !allowed.contains(&new_status) {
        let valid = allowed
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AppError::StateTransition(format!(
            "invalid state transition: '{old_status}' -> '{new_status}'. Valid transitions from '{old_status}' are: {valid}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ApplicationStatus; 7] = [
        Pending, Validating, Approved, Rejected, UnderReview, Cancelled, Completed,
    ];

    #[test]
    fn pending_can_start_validation_or_cancel() {
        assert!(validate_transition(Pending, Validating).is_ok());
        assert!(validate_transition(Pending, Cancelled).is_ok());
        assert!(validate_transition(Pending, Approved).is_err());
    }

    #[test]
    fn validating_reaches_all_outcomes() {
        assert!(validate_transition(Validating, Approved).is_ok());
        assert!(validate_transition(Validating, Rejected).is_ok());
        assert!(validate_transition(Validating, UnderReview).is_ok());
        assert!(validate_transition(Validating, Pending).is_err());
    }

    #[test]
    fn under_review_resolves_to_approved_or_rejected() {
        assert!(validate_transition(UnderReview, Approved).is_ok());
        assert!(validate_transition(UnderReview, Rejected).is_ok());
        assert!(validate_transition(UnderReview, Validating).is_err());
    }

    #[test]
    fn final_states_have_no_exits() {
        for from in FINAL_STATES {
            for to in ALL {
                if from == to {
                    continue;
                }
                assert!(
                    validate_transition(from, to).is_err(),
                    "{from} -> {to} should be rejected"
                );
            }
        }
    }

    #[test]
    fn self_transition_is_a_noop() {
        for status in ALL {
            assert!(validate_transition(status, status).is_ok());
        }
    }

    // Every state reachable from PENDING through permitted transitions is a
    // known state (closure property).
    #[test]
    fn reachable_states_are_closed_over_the_transition_table() {
        let mut seen = vec![Pending];
        let mut frontier = vec![Pending];
        while let Some(state) = frontier.pop() {
            for &next in allowed_transitions(state) {
                assert!(ALL.contains(&next));
                if !seen.contains(&next) {
                    seen.push(next);
                    frontier.push(next);
                }
            }
        }
        // COMPLETED is administrative-only; everything else is reachable.
        assert_eq!(seen.len(), 6);
        assert!(!seen.contains(&Completed));
    }
}
