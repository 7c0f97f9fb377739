//! Per-goal and household orchestration.
//!
//! Each goal is analysed in its own tokio task; allocation and compound
//! strategies are computed once every task has finished.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::allocator::{allocate, available_budget, priority_weight};
use super::combiner::{CombinableGoal, combine_goals};
use super::config::{PlannerConfig, RequirementSource};
use super::error::PlanError;
use super::gap::analyze_gap;
use super::generator::{AdjustmentGenerator, GenerationContext};
use super::oracle::{GoalConfiguration, OracleClient};
use super::ranker::RecommendationRanker;
use super::solver::{ContributionSolveConfig, solve_required_contribution};
use super::types::{
    AdjustmentRecommendation, AllocationPlan, CompoundStrategy, ContributionRequest, GapResult,
    Goal, Profile,
};

#[derive(Debug, Clone, Deserialize)]
pub struct HouseholdInput {
    pub profile: Profile,
    pub goals: Vec<Goal>,
}

/// Outcome for one goal. Exactly one of `recommendation` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalReport {
    pub goal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<GapResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<AdjustmentRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_monthly_contribution: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdPlan {
    pub goals: Vec<GoalReport>,
    pub allocation: AllocationPlan,
    pub compound_strategies: Vec<CompoundStrategy>,
    pub degraded: bool,
}

/// Monthly amount a goal asks the allocator for. `degraded` is set when the
/// solver fell back to the heuristic estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionRequirement {
    pub monthly_amount: f64,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
struct GoalEvaluation {
    gap: GapResult,
    recommendation: AdjustmentRecommendation,
    requirement: ContributionRequirement,
}

pub struct GoalPlanner {
    oracle: OracleClient,
    config: Arc<PlannerConfig>,
}

impl GoalPlanner {
    pub fn new(oracle: OracleClient, config: Arc<PlannerConfig>) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub async fn recommend(
        &self,
        goal: &Goal,
        profile: &Profile,
        target_probability: Option<f64>,
    ) -> Result<AdjustmentRecommendation, PlanError> {
        let gap = analyze_gap(goal, profile, &self.config)?;
        self.recommend_with_gap(goal, profile, &gap, target_probability)
            .await
    }

    async fn recommend_with_gap(
        &self,
        goal: &Goal,
        profile: &Profile,
        gap: &GapResult,
        target_probability: Option<f64>,
    ) -> Result<AdjustmentRecommendation, PlanError> {
        let target_probability =
            target_probability.unwrap_or(self.config.adjustment.default_target_probability);
        if !(0.0..=1.0).contains(&target_probability) {
            return Err(PlanError::invalid_goal(
                &goal.id,
                "target_probability must be between 0 and 1",
            ));
        }

        let baseline = GoalConfiguration::from_goal(goal, gap.months_remaining);
        let estimate = self.oracle.probability(&baseline, profile).await;

        if estimate.probability >= target_probability {
            return Ok(AdjustmentRecommendation {
                goal_id: goal.id.clone(),
                current_probability: estimate.probability,
                target_probability,
                adjustment_options: Vec::new(),
                degraded: estimate.degraded,
                note: Some("goal already meets the target probability".to_string()),
            });
        }

        let generator = AdjustmentGenerator::new(&self.config, &self.oracle);
        let ctx = GenerationContext {
            goal,
            profile,
            gap,
            baseline: &baseline,
            baseline_probability: estimate.probability,
            baseline_degraded: estimate.degraded,
        };
        Ok(RecommendationRanker::new(&self.config.adjustment)
            .recommend(&generator, &ctx, target_probability)
            .await)
    }

    /// Monthly contribution the goal needs, from the annuity formula or from
    /// a bisection against the oracle.
    pub async fn required_contribution(
        &self,
        goal: &Goal,
        profile: &Profile,
        gap: &GapResult,
    ) -> Result<ContributionRequirement, PlanError> {
        let analytic = ContributionRequirement {
            monthly_amount: gap.required_monthly_contribution,
            degraded: false,
        };
        match self.config.allocation.requirement_source {
            RequirementSource::Analytic => Ok(analytic),
            RequirementSource::Simulated => {
                let solve = ContributionSolveConfig::for_profile(profile, &self.config.allocation.solver);
                if solve.search_max <= solve.search_min {
                    // no income to search over
                    warn!(
                        goal_id = %goal.id,
                        search_max = solve.search_max,
                        "empty contribution search range, using analytic requirement"
                    );
                    return Ok(analytic);
                }
                let configuration = GoalConfiguration::from_goal(goal, gap.months_remaining);
                let result =
                    solve_required_contribution(&self.oracle, &configuration, profile, solve).await?;
                Ok(ContributionRequirement {
                    // An unreachable target still asks for the whole search range.
                    monthly_amount: result.solved_value.unwrap_or(result.search_max),
                    degraded: result.degraded,
                })
            }
        }
    }

    async fn evaluate(&self, goal: &Goal, profile: &Profile) -> Result<GoalEvaluation, PlanError> {
        let gap = analyze_gap(goal, profile, &self.config)?;
        let recommendation = self.recommend_with_gap(goal, profile, &gap, None).await?;
        let requirement = self.required_contribution(goal, profile, &gap).await?;
        Ok(GoalEvaluation {
            gap,
            recommendation,
            requirement,
        })
    }
}

pub struct HouseholdPlanner {
    planner: Arc<GoalPlanner>,
}

impl HouseholdPlanner {
    pub fn new(planner: Arc<GoalPlanner>) -> Self {
        Self { planner }
    }

    pub async fn plan(&self, goals: Vec<Goal>, profile: Profile) -> HouseholdPlan {
        let profile = Arc::new(profile);
        let goals: Vec<Arc<Goal>> = goals.into_iter().map(Arc::new).collect();

        let handles: Vec<_> = goals
            .iter()
            .map(|goal| {
                let planner = Arc::clone(&self.planner);
                let goal = Arc::clone(goal);
                let profile = Arc::clone(&profile);
                tokio::spawn(async move { planner.evaluate(&goal, &profile).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (goal, handle) in goals.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(PlanError::OracleUnavailable(format!("goal task failed: {err}"))),
            };
            if let Err(err) = &result {
                warn!(goal_id = %goal.id, error = %err, "goal skipped");
            }
            results.push(result);
        }

        let config = self.planner.config();
        let mut reports = Vec::with_capacity(goals.len());
        let mut requests = Vec::new();
        let mut combinable = Vec::new();
        let mut degraded = false;

        for (goal, result) in goals.iter().zip(&results) {
            match result {
                Ok(evaluation) => {
                    let months = evaluation.gap.months_remaining;
                    degraded |=
                        evaluation.recommendation.degraded || evaluation.requirement.degraded;
                    requests.push(ContributionRequest {
                        goal_id: goal.id.clone(),
                        category: goal.category.clone(),
                        priority: goal.priority,
                        horizon_months: months,
                        requested_monthly_amount: evaluation.requirement.monthly_amount,
                    });
                    combinable.push(CombinableGoal {
                        goal: goal.as_ref(),
                        horizon_months: months,
                        priority_weight: priority_weight(
                            &goal.category,
                            goal.priority,
                            months,
                            &config.categories,
                            &config.allocation,
                        ),
                    });
                    reports.push(GoalReport {
                        goal_id: goal.id.clone(),
                        gap: Some(evaluation.gap.clone()),
                        recommendation: Some(evaluation.recommendation.clone()),
                        required_monthly_contribution: Some(evaluation.requirement.monthly_amount),
                        error: None,
                    });
                }
                Err(err) => reports.push(GoalReport {
                    goal_id: goal.id.clone(),
                    gap: None,
                    recommendation: None,
                    required_monthly_contribution: None,
                    error: Some(err.to_string()),
                }),
            }
        }

        let budget = available_budget(&profile, &config.allocation);
        let allocation = allocate(&requests, budget, &config.categories, &config.allocation);
        let compound_strategies = combine_goals(&combinable, &config.combiner);

        info!(
            goals = reports.len(),
            failed = reports.iter().filter(|r| r.error.is_some()).count(),
            strategies = compound_strategies.len(),
            "household plan ready"
        );

        HouseholdPlan {
            goals: reports,
            allocation,
            compound_strategies,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::OracleError;
    use crate::core::oracle::{HeuristicEstimator, ProbabilityOracle, SimulationOutcome};
    use async_trait::async_trait;
    use crate::core::testing::{
        AxisStubOracle, goal, scenario_config, scenario_goal, scenario_profile,
    };
    use crate::core::types::TimeHorizon;

    fn scenario_planner(config: PlannerConfig) -> GoalPlanner {
        let goal = scenario_goal();
        let baseline = GoalConfiguration::from_goal(&goal, 240);
        let oracle = OracleClient::from_config(Arc::new(AxisStubOracle::scenario(baseline)), &config);
        GoalPlanner::new(oracle, Arc::new(config))
    }

    fn heuristic_planner(config: PlannerConfig) -> GoalPlanner {
        let oracle: Arc<dyn ProbabilityOracle> =
            Arc::new(HeuristicEstimator::new(config.projection.clone()));
        GoalPlanner::new(OracleClient::from_config(oracle, &config), Arc::new(config))
    }

    #[tokio::test]
    async fn recommend_ranks_scenario_options() {
        let planner = scenario_planner(scenario_config());
        let recommendation = planner
            .recommend(&scenario_goal(), &scenario_profile(), Some(0.80))
            .await
            .expect("valid goal");

        assert_eq!(recommendation.current_probability, 0.65);
        assert_eq!(recommendation.single_options().count(), 3);
        assert!(recommendation.combined_options().count() > 0);
    }

    #[tokio::test]
    async fn on_track_goal_returns_no_options() {
        let planner = scenario_planner(scenario_config());
        let recommendation = planner
            .recommend(&scenario_goal(), &scenario_profile(), Some(0.60))
            .await
            .expect("valid goal");
        assert!(recommendation.adjustment_options.is_empty());
        assert!(recommendation.note.is_some());
    }

    #[tokio::test]
    async fn invalid_goal_is_rejected_before_any_simulation() {
        let planner = scenario_planner(scenario_config());
        let mut bad = scenario_goal();
        bad.target_amount = f64::NAN;
        let err = planner
            .recommend(&bad, &scenario_profile(), None)
            .await
            .expect_err("must reject");
        assert!(err.is_invalid_goal());
    }

    #[tokio::test]
    async fn unbounded_horizon_is_rejected_instead_of_extended() {
        let planner = scenario_planner(scenario_config());
        let mut endless = scenario_goal();
        endless.time_horizon = TimeHorizon::Months(u32::MAX);
        let err = planner
            .recommend(&endless, &scenario_profile(), Some(1.0))
            .await
            .expect_err("must reject");
        assert!(err.is_invalid_goal());
    }

    #[tokio::test]
    async fn simulated_requirement_uses_solver() {
        let mut config = scenario_config();
        config.allocation.requirement_source = RequirementSource::Simulated;
        config.allocation.solver.target_probability = 0.70;
        let planner = scenario_planner(config);
        let goal = scenario_goal();
        let profile = scenario_profile();
        let gap = analyze_gap(&goal, &profile, planner.config()).expect("valid goal");

        // any contribution change lifts the stub to 0.73, so the lower
        // search bound already meets the target
        let required = planner
            .required_contribution(&goal, &profile, &gap)
            .await
            .expect("solvable");
        assert_eq!(required.monthly_amount, 0.0);
        assert!(!required.degraded);
    }

    #[tokio::test]
    async fn zero_income_keeps_recommendation_with_simulated_requirement() {
        let mut config = scenario_config();
        config.allocation.requirement_source = RequirementSource::Simulated;
        let planner = Arc::new(scenario_planner(config));
        let mut profile = scenario_profile();
        profile.monthly_income = 0.0;
        let gap = analyze_gap(&scenario_goal(), &profile, planner.config()).expect("valid goal");

        let plan = HouseholdPlanner::new(planner)
            .plan(vec![scenario_goal()], profile)
            .await;

        let report = &plan.goals[0];
        assert!(report.error.is_none(), "unexpected error {:?}", report.error);
        assert!(report.recommendation.is_some());
        assert_eq!(
            report.required_monthly_contribution,
            Some(gap.required_monthly_contribution)
        );
    }

    struct FailingOracle;

    #[async_trait]
    impl ProbabilityOracle for FailingOracle {
        async fn simulate(
            &self,
            _configuration: &GoalConfiguration,
            _profile: &Profile,
        ) -> Result<SimulationOutcome, OracleError> {
            Err(OracleError::Failed("simulator offline".to_string()))
        }
    }

    #[tokio::test]
    async fn solver_fallback_marks_household_plan_degraded() {
        let mut config = scenario_config();
        config.allocation.requirement_source = RequirementSource::Simulated;
        let oracle = OracleClient::from_config(Arc::new(FailingOracle), &config);
        let planner = Arc::new(GoalPlanner::new(oracle, Arc::new(config)));
        let goal = scenario_goal();
        let profile = scenario_profile();
        let gap = analyze_gap(&goal, &profile, planner.config()).expect("valid goal");

        let requirement = planner
            .required_contribution(&goal, &profile, &gap)
            .await
            .expect("solver runs on the fallback estimator");
        assert!(requirement.degraded);

        let plan = HouseholdPlanner::new(planner).plan(vec![goal], profile).await;
        assert!(plan.goals[0].error.is_none());
        assert!(plan.degraded);
    }

    #[tokio::test]
    async fn household_plan_isolates_failures() {
        let planner = Arc::new(heuristic_planner(PlannerConfig::default()));
        let mut broken = goal("broken", "travel", 5_000.0, 12);
        broken.time_horizon = TimeHorizon::Months(0);

        let mut school = goal("school", "education", 60_000.0, 60);
        school.monthly_contribution = 300.0;
        let mut wedding = goal("wedding", "wedding", 30_000.0, 200);
        wedding.monthly_contribution = 100.0;

        let plan = HouseholdPlanner::new(planner)
            .plan(vec![school, broken, wedding], scenario_profile())
            .await;

        assert_eq!(plan.goals.len(), 3);
        assert_eq!(plan.goals[1].goal_id, "broken");
        assert!(plan.goals[1].error.is_some());
        assert!(plan.goals[1].recommendation.is_none());
        assert!(plan.goals[0].recommendation.is_some());
        assert!(plan.goals[2].error.is_none());

        assert_eq!(plan.allocation.allocations.len(), 2);
        assert!(plan.allocation.allocation_for("broken").is_none());
        assert!(plan.allocation.total_allocated <= plan.allocation.available_budget + 1e-6);

        assert_eq!(plan.compound_strategies.len(), 1);
        assert_eq!(
            plan.compound_strategies[0].goal_ids,
            vec!["school".to_string(), "wedding".to_string()]
        );
        assert!(!plan.degraded);
    }

    #[test]
    fn household_input_parses_target_dates() {
        let input: HouseholdInput = serde_json::from_str(
            r#"{
                "profile": {"monthly_income": 9000, "monthly_expenses": 5000, "age": 33,
                            "as_of": "2026-01-01"},
                "goals": [{
                    "id": "home", "category": "Home Purchase",
                    "target_amount": 80000, "current_amount": 10000,
                    "time_horizon": {"target_date": "2031-01-01"},
                    "asset_allocation": {"equity": 0.6, "debt": 0.4}
                }]
            }"#,
        )
        .expect("valid input");
        assert_eq!(input.goals[0].category.as_str(), "home_purchase");
        assert_eq!(
            input.goals[0].time_horizon.months_from(input.profile.as_of),
            Some(60)
        );
    }
}
