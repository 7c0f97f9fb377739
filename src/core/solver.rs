use serde::Serialize;
use tracing::debug;

use super::config::SolverConfig;
use super::error::PlanError;
use super::oracle::{Estimate, GoalConfiguration, OracleClient};
use super::types::Profile;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ContributionSolveConfig {
    pub target_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl ContributionSolveConfig {
    /// Searches from nothing up to a multiple of the profile's income.
    pub fn for_profile(profile: &Profile, solver: &SolverConfig) -> Self {
        Self {
            target_probability: solver.target_probability,
            search_min: 0.0,
            search_max: (profile.monthly_income * solver.search_max_income_multiple).max(0.0),
            tolerance: solver.tolerance,
            max_iterations: solver.max_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub success_probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContributionSolveResult {
    pub goal_id: String,
    pub target_probability: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub solved_value: Option<f64>,
    pub achieved_probability: Option<f64>,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    /// Some oracle call during the search fell back to the heuristic.
    pub degraded: bool,
    pub message: String,
}

/// Bisects on the monthly contribution until the oracle reports the target
/// success probability.
pub async fn solve_required_contribution(
    oracle: &OracleClient,
    configuration: &GoalConfiguration,
    profile: &Profile,
    config: ContributionSolveConfig,
) -> Result<ContributionSolveResult, PlanError> {
    validate_config(config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low = evaluate_candidate(oracle, configuration, profile, config.search_min).await;
    let high = evaluate_candidate(oracle, configuration, profile, config.search_max).await;
    let mut degraded = low.degraded || high.degraded;
    let (low, high) = (low.probability, high.probability);

    let mut solved_value = None;
    let mut achieved_probability = None;
    let mut converged = false;
    let feasible;
    let message;

    if low + 1e-12 >= config.target_probability {
        solved_value = Some(config.search_min);
        achieved_probability = Some(low);
        converged = true;
        feasible = true;
        message = "Already meets target at lower contribution bound.".to_string();
    } else if high + 1e-12 < config.target_probability {
        feasible = false;
        message = "No feasible contribution found within the search bounds.".to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut hi_probability = high;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(oracle, configuration, profile, mid).await;
            degraded |= eval.degraded;
            let probability = eval.probability;
            iterations.push(SolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                success_probability: probability,
            });

            if probability + 1e-12 >= config.target_probability {
                hi = mid;
                hi_probability = probability;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(hi);
        achieved_probability = Some(hi_probability);
        feasible = true;
        message = if converged {
            "Solved required contribution.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    debug!(
        goal_id = %configuration.goal_id,
        iterations = iterations.len(),
        feasible,
        "contribution solve finished"
    );

    Ok(ContributionSolveResult {
        goal_id: configuration.goal_id.clone(),
        target_probability: config.target_probability,
        search_min: config.search_min,
        search_max: config.search_max,
        solved_value,
        achieved_probability,
        iterations,
        converged,
        feasible,
        degraded,
        message,
    })
}

async fn evaluate_candidate(
    oracle: &OracleClient,
    configuration: &GoalConfiguration,
    profile: &Profile,
    candidate_value: f64,
) -> Estimate {
    oracle
        .probability(&configuration.with_contribution(candidate_value), profile)
        .await
}

fn validate_config(config: ContributionSolveConfig) -> Result<(), PlanError> {
    let fail = |msg: &str| Err(PlanError::InvalidConfig(msg.to_string()));
    if !(0.0..=1.0).contains(&config.target_probability) {
        return fail("target_probability must be between 0 and 1");
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return fail("search bounds must be finite");
    }
    if config.search_min < 0.0 {
        return fail("search_min must be >= 0");
    }
    if config.search_max <= config.search_min {
        return fail("search_max must be greater than search_min");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return fail("tolerance must be > 0");
    }
    if config.max_iterations == 0 {
        return fail("max_iterations must be > 0");
    }
    Ok(())
}
