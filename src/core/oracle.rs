//! Probability oracle seam.
//!
//! The stochastic simulator lives outside this crate and is reached through
//! [`ProbabilityOracle`]. [`OracleClient`] bounds every call with a timeout and
//! substitutes the deterministic [`HeuristicEstimator`] when the simulator is
//! slow or failing, flagging the result as degraded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use super::config::{PlannerConfig, ProjectionConfig};
use super::error::OracleError;
use super::gap::{future_value, monthly_rate};
use super::types::{AdjustmentPatch, AssetAllocation, Goal, GoalCategory, Profile};

/// Value copy of the fields a simulation depends on. Built from a goal and
/// modified freely without touching the goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalConfiguration {
    pub goal_id: String,
    pub category: GoalCategory,
    pub target_amount: f64,
    pub current_amount: f64,
    pub horizon_months: u32,
    pub monthly_contribution: f64,
    pub asset_allocation: AssetAllocation,
}

impl GoalConfiguration {
    pub fn from_goal(goal: &Goal, horizon_months: u32) -> Self {
        Self {
            goal_id: goal.id.clone(),
            category: goal.category.clone(),
            target_amount: goal.target_amount,
            current_amount: goal.current_amount,
            horizon_months,
            monthly_contribution: goal.monthly_contribution,
            asset_allocation: goal.asset_allocation.clone(),
        }
    }

    pub fn apply(&self, patch: &AdjustmentPatch) -> Self {
        Self {
            goal_id: self.goal_id.clone(),
            category: self.category.clone(),
            target_amount: patch.target_amount.unwrap_or(self.target_amount),
            current_amount: self.current_amount,
            horizon_months: patch.horizon_months.unwrap_or(self.horizon_months),
            monthly_contribution: patch
                .monthly_contribution
                .unwrap_or(self.monthly_contribution),
            asset_allocation: patch
                .asset_allocation
                .clone()
                .unwrap_or_else(|| self.asset_allocation.clone()),
        }
    }

    pub fn with_contribution(&self, monthly_contribution: f64) -> Self {
        self.apply(&AdjustmentPatch {
            monthly_contribution: Some(monthly_contribution),
            ..AdjustmentPatch::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub success_probability: f64,
    /// Simulator-specific payload, passed through untouched.
    pub outcome_distribution: serde_json::Value,
}

/// External success-probability simulator.
///
/// Implementations must be pure with respect to their inputs: the same
/// configuration and profile yield the same outcome, and nothing is mutated.
#[async_trait]
pub trait ProbabilityOracle: Send + Sync {
    async fn simulate(
        &self,
        configuration: &GoalConfiguration,
        profile: &Profile,
    ) -> Result<SimulationOutcome, OracleError>;
}

/// Closed-form stand-in for the simulator: treats the terminal balance as
/// lognormal around the deterministic projection.
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    projection: ProjectionConfig,
}

impl HeuristicEstimator {
    pub fn new(projection: ProjectionConfig) -> Self {
        Self { projection }
    }

    pub fn projected_value(&self, configuration: &GoalConfiguration) -> f64 {
        let rate = monthly_rate(
            configuration
                .asset_allocation
                .expected_return(&self.projection.expected_returns),
        );
        future_value(
            configuration.current_amount,
            configuration.monthly_contribution,
            configuration.horizon_months,
            rate,
        )
    }

    pub fn estimate(&self, configuration: &GoalConfiguration) -> f64 {
        if configuration.target_amount <= 0.0 {
            return 0.99;
        }
        let projected = self.projected_value(configuration);
        if projected <= 0.0 {
            return 0.01;
        }

        let volatility = configuration
            .asset_allocation
            .expected_return(&self.projection.expected_volatility);
        let years = configuration.horizon_months as f64 / 12.0;
        let spread = (volatility * years.sqrt()).max(0.05);
        let z = (projected / configuration.target_amount).ln() / spread;
        let probability = 1.0 / (1.0 + (-1.7 * z).exp());
        probability.clamp(0.01, 0.99)
    }
}

#[async_trait]
impl ProbabilityOracle for HeuristicEstimator {
    async fn simulate(
        &self,
        configuration: &GoalConfiguration,
        _profile: &Profile,
    ) -> Result<SimulationOutcome, OracleError> {
        let projected = self.projected_value(configuration);
        let funded_ratio = if configuration.target_amount > 0.0 {
            projected / configuration.target_amount
        } else {
            1.0
        };
        Ok(SimulationOutcome {
            success_probability: self.estimate(configuration),
            outcome_distribution: json!({
                "method": "heuristic",
                "projected_value": projected,
                "funded_ratio": funded_ratio,
            }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub probability: f64,
    pub degraded: bool,
}

/// Timeout-bounded access to the oracle with heuristic fallback. Cheap to
/// clone; share one per household pass.
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn ProbabilityOracle>,
    fallback: HeuristicEstimator,
    timeout: Duration,
}

impl OracleClient {
    pub fn new(
        oracle: Arc<dyn ProbabilityOracle>,
        fallback: HeuristicEstimator,
        timeout: Duration,
    ) -> Self {
        Self {
            oracle,
            fallback,
            timeout,
        }
    }

    pub fn from_config(oracle: Arc<dyn ProbabilityOracle>, config: &PlannerConfig) -> Self {
        Self::new(
            oracle,
            HeuristicEstimator::new(config.projection.clone()),
            config.oracle_timeout(),
        )
    }

    pub async fn probability(
        &self,
        configuration: &GoalConfiguration,
        profile: &Profile,
    ) -> Estimate {
        let outcome =
            tokio::time::timeout(self.timeout, self.oracle.simulate(configuration, profile)).await;
        let failure = match outcome {
            Ok(Ok(outcome)) if outcome.success_probability.is_finite() => {
                return Estimate {
                    probability: outcome.success_probability.clamp(0.0, 1.0),
                    degraded: false,
                };
            }
            Ok(Ok(outcome)) => OracleError::Failed(format!(
                "non-finite probability {}",
                outcome.success_probability
            )),
            Ok(Err(err)) => err,
            Err(_) => OracleError::Timeout(self.timeout.as_millis() as u64),
        };

        warn!(
            goal_id = %configuration.goal_id,
            error = %failure,
            "oracle unavailable, using heuristic estimate"
        );
        Estimate {
            probability: self.fallback.estimate(configuration),
            degraded: true,
        }
    }
}
