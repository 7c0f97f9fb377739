use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("invalid data for goal '{goal_id}': {reason}")]
    InvalidGoalData { goal_id: String, reason: String },

    #[error("probability oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error(
        "budget-adjusted: required {required:.2} per month exceeds available budget {available:.2}"
    )]
    InfeasibleBudget { required: f64, available: f64 },

    #[error("no adjustment meaningfully improves goal '{goal_id}'")]
    NoViableAdjustment { goal_id: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PlanError {
    pub fn invalid_goal(goal_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGoalData {
            goal_id: goal_id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_goal(&self) -> bool {
        matches!(self, Self::InvalidGoalData { .. })
    }
}

/// Failure reported by a probability oracle implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("simulation timed out after {0} ms")]
    Timeout(u64),

    #[error("simulation failed: {0}")]
    Failed(String),
}

impl From<OracleError> for PlanError {
    fn from(value: OracleError) -> Self {
        Self::OracleUnavailable(value.to_string())
    }
}
