//! Engine error taxonomy.
//!
//! Channel and resource failures are recovered locally with documented
//! fallbacks and never surface here. What does surface is either a missing
//! entity or an invariant violation — the latter indicates a caller bug
//! and is logged as critical at the point of rejection.

use uuid::Uuid;

use crate::model::CrisisLevel;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("intervention {0} not found")]
    InterventionNotFound(Uuid),

    /// Escalation is monotonic; moving an alert to a lower level is a
    /// caller bug, not a runtime condition.
    #[error("cannot de-escalate alert {id} from {from:?} to {to:?}")]
    DeEscalation {
        id: Uuid,
        from: CrisisLevel,
        to: CrisisLevel,
    },

    /// A resolved alert is terminal; renewed risk opens a new alert.
    #[error("alert {0} is already resolved")]
    AlertResolved(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether this error indicates a caller bug rather than a missing
    /// entity or infrastructure failure.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            EngineError::DeEscalation { .. } | EngineError::AlertResolved(_)
        )
    }
}
