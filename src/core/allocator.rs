use tracing::info;

use super::config::{AllocationConfig, CategoryTable};
use super::error::PlanError;
use super::types::{AllocationPlan, ContributionRequest, GoalAllocation, GoalCategory, Priority, Profile};

const BUDGET_EPSILON: f64 = 1e-6;

/// Monthly surplus the household may commit to goals.
pub fn available_budget(profile: &Profile, config: &AllocationConfig) -> f64 {
    let surplus = profile.disposable_income();
    if !surplus.is_finite() {
        return 0.0;
    }
    surplus.max(0.0) * config.max_investment_fraction
}

pub fn priority_weight(
    category: &GoalCategory,
    priority: Priority,
    horizon_months: u32,
    categories: &CategoryTable,
    config: &AllocationConfig,
) -> f64 {
    let horizon_factor = if horizon_months <= config.short_horizon_months {
        config.short_horizon_boost
    } else if horizon_months >= config.long_horizon_months {
        config.long_horizon_penalty
    } else {
        1.0
    };
    categories.lookup(category).priority_weight
        * config.priority_multipliers.for_priority(priority)
        * horizon_factor
}

fn sanitized(amount: f64) -> f64 {
    if amount.is_finite() { amount.max(0.0) } else { 0.0 }
}

/// Splits `available_budget` across the requests.
///
/// Every goal first receives up to the minimum SIP, highest weight first.
/// Whatever is left is water-filled in proportion to weight among goals still
/// short of their request, so no goal ever receives more than it asked for.
pub fn allocate(
    requests: &[ContributionRequest],
    available_budget: f64,
    categories: &CategoryTable,
    config: &AllocationConfig,
) -> AllocationPlan {
    let budget = sanitized(available_budget);
    let requested: Vec<f64> = requests
        .iter()
        .map(|r| sanitized(r.requested_monthly_amount))
        .collect();
    let weights: Vec<f64> = requests
        .iter()
        .map(|r| priority_weight(&r.category, r.priority, r.horizon_months, categories, config))
        .collect();
    let total_required: f64 = requested.iter().sum();
    let mut allocated = vec![0.0; requests.len()];

    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));

    let mut remaining = budget;
    for &i in &order {
        let reserve = requested[i].min(config.minimum_sip).min(remaining);
        allocated[i] = reserve;
        remaining -= reserve;
    }

    for _ in 0..=requests.len() {
        let unmet: Vec<usize> = (0..requests.len())
            .filter(|&i| requested[i] - allocated[i] > BUDGET_EPSILON)
            .collect();
        if unmet.is_empty() || remaining <= BUDGET_EPSILON {
            break;
        }
        let total_weight: f64 = unmet.iter().map(|&i| weights[i]).sum();
        if total_weight <= 0.0 {
            break;
        }
        let mut distributed = 0.0;
        for &i in &unmet {
            let share = remaining * weights[i] / total_weight;
            let give = share.min(requested[i] - allocated[i]);
            allocated[i] += give;
            distributed += give;
        }
        remaining -= distributed;
        if distributed <= BUDGET_EPSILON {
            break;
        }
    }

    let feasible = total_required <= budget + BUDGET_EPSILON;
    let note = (!feasible).then(|| {
        PlanError::InfeasibleBudget {
            required: total_required,
            available: budget,
        }
        .to_string()
    });

    let allocations: Vec<GoalAllocation> = requests
        .iter()
        .enumerate()
        .map(|(i, request)| GoalAllocation {
            goal_id: request.goal_id.clone(),
            requested_monthly_amount: requested[i],
            allocated_monthly_amount: allocated[i],
            priority_weight: weights[i],
            note: note.clone(),
        })
        .collect();
    let total_allocated = allocated.iter().sum();

    info!(
        goals = requests.len(),
        total_required,
        available_budget = budget,
        feasible,
        "budget allocated"
    );

    AllocationPlan {
        feasible,
        available_budget: budget,
        total_required,
        total_allocated,
        allocations,
    }
}
