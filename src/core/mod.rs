mod allocator;
mod combiner;
mod config;
mod error;
mod gap;
mod generator;
mod oracle;
mod planner;
mod ranker;
mod solver;
mod suitability;
mod types;

#[cfg(test)]
mod testing;

pub use allocator::{allocate, available_budget, priority_weight};
pub use combiner::{CombinableGoal, combine_goals, combine_reason, merge_pair};
pub use config::{
    AdjustmentConfig, AllocationConfig, CategoryProfile, CategoryTable, CombinerConfig,
    HorizonShift, PlannerConfig, PriorityMultipliers, ProjectionConfig, RankingMode,
    RequirementSource, SeverityBands, SolverConfig,
};
pub use error::{OracleError, PlanError};
pub use gap::{analyze_gap, future_value, monthly_rate, required_monthly_contribution};
pub use generator::{AdjustmentGenerator, GenerationContext};
pub use oracle::{
    Estimate, GoalConfiguration, HeuristicEstimator, OracleClient, ProbabilityOracle,
    SimulationOutcome,
};
pub use planner::{
    ContributionRequirement, GoalPlanner, GoalReport, HouseholdInput, HouseholdPlan,
    HouseholdPlanner,
};
pub use ranker::{RecommendationRanker, needs_combined};
pub use solver::{
    ContributionSolveConfig, ContributionSolveResult, SolveIteration, solve_required_contribution,
};
pub use suitability::{ScoringContext, SuitabilityScorer, confidence_for};
pub use types::{
    AdjustmentImpact, AdjustmentOption, AdjustmentPatch, AdjustmentRecommendation,
    AllocationPlan, AssetAllocation, AssetClass, Axis, ClassBounds, CombineReason,
    CompoundStatus, CompoundStrategy, ContributionRequest, GapResult, Goal, GoalAllocation,
    GoalCategory, LifeStage, OptionKind, Priority, Profile, RiskTolerance, Severity, TimeHorizon,
};
