use serde::{Deserialize, Serialize};

/// Graph supervisor states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GraphState {
    /// No run in progress
    #[default]
    Idle,
    /// Children started, monitoring their reports
    Running,
    /// Cancellation issued, waiting for children to acknowledge
    TearingDown,
}

impl GraphState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &GraphState) -> bool {
        use GraphState::*;

        matches!(
            (self, target),
            (Idle, Running) | (Running, TearingDown) | (TearingDown, Idle)
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::TearingDown => "TearingDown",
        }
    }
}
