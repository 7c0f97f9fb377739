//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::config::{PlannerConfig, RankingMode};
use super::error::OracleError;
use super::oracle::{GoalConfiguration, ProbabilityOracle, SimulationOutcome};
use super::types::{AssetAllocation, AssetClass, Goal, GoalCategory, Priority, Profile, TimeHorizon};

/// Deterministic oracle: a base probability plus a fixed delta for every
/// field that differs from the baseline, plus a bonus per extra changed field
/// so composites are visibly not the sum of their parts.
pub struct AxisStubOracle {
    pub baseline: GoalConfiguration,
    pub base: f64,
    pub target: f64,
    pub timeframe: f64,
    pub contribution: f64,
    pub allocation: f64,
    pub composite_bonus: f64,
}

impl AxisStubOracle {
    pub fn scenario(baseline: GoalConfiguration) -> Self {
        Self {
            baseline,
            base: 0.65,
            target: 0.10,
            timeframe: 0.12,
            contribution: 0.08,
            allocation: 0.0,
            composite_bonus: 0.01,
        }
    }

    pub fn probability_for(&self, configuration: &GoalConfiguration) -> f64 {
        let changed = [
            (configuration.target_amount != self.baseline.target_amount, self.target),
            (configuration.horizon_months != self.baseline.horizon_months, self.timeframe),
            (
                configuration.monthly_contribution != self.baseline.monthly_contribution,
                self.contribution,
            ),
            (
                configuration.asset_allocation != self.baseline.asset_allocation,
                self.allocation,
            ),
        ];
        let count = changed.iter().filter(|(hit, _)| *hit).count();
        let delta: f64 = changed.iter().filter(|(hit, _)| *hit).map(|(_, d)| d).sum();
        let bonus = self.composite_bonus * count.saturating_sub(1) as f64;
        (self.base + delta + bonus).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl ProbabilityOracle for AxisStubOracle {
    async fn simulate(
        &self,
        configuration: &GoalConfiguration,
        _profile: &Profile,
    ) -> Result<SimulationOutcome, OracleError> {
        Ok(SimulationOutcome {
            success_probability: self.probability_for(configuration),
            outcome_distribution: serde_json::Value::Null,
        })
    }
}

/// Zero expected returns keep projections linear and easy to check by hand.
pub fn scenario_config() -> PlannerConfig {
    let mut config = PlannerConfig::default();
    for rate in config.projection.expected_returns.values_mut() {
        *rate = 0.0;
    }
    config.adjustment.max_target_reduction = 0.10;
    config.adjustment.max_extension_months = 24;
    config.adjustment.max_contribution_increase_percent = 0.10;
    config.adjustment.min_contribution_increase = 100.0;
    // Ranking tests assert probability-change order; the default suitability
    // mode would order the scenario options by score instead.
    config.adjustment.ranking_mode = RankingMode::Impact;
    config
}

pub fn scenario_profile() -> Profile {
    Profile {
        monthly_income: 5_000.0,
        monthly_expenses: 2_000.0,
        age: 40,
        risk_tolerance: Default::default(),
        life_stage: Default::default(),
        as_of: NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date"),
    }
}

pub fn scenario_goal() -> Goal {
    Goal {
        id: "retire".to_string(),
        name: "Retirement".to_string(),
        category: GoalCategory::new("retirement"),
        target_amount: 1_000_000.0,
        current_amount: 300_000.0,
        time_horizon: TimeHorizon::Months(240),
        monthly_contribution: 1_000.0,
        priority: Priority::High,
        asset_allocation: AssetAllocation::new([(AssetClass::Equity, 0.5), (AssetClass::Debt, 0.5)]),
        has_fixed_deadline: false,
    }
}

pub fn goal(id: &str, category: &str, target: f64, months: u32) -> Goal {
    Goal {
        id: id.to_string(),
        name: String::new(),
        category: GoalCategory::new(category),
        target_amount: target,
        current_amount: 0.0,
        time_horizon: TimeHorizon::Months(months),
        monthly_contribution: 0.0,
        priority: Priority::Medium,
        asset_allocation: AssetAllocation::new([(AssetClass::Equity, 0.5), (AssetClass::Debt, 0.5)]),
        has_fixed_deadline: false,
    }
}
