use super::config::PlannerConfig;
use super::error::PlanError;
use super::types::{GapResult, Goal, Profile};

pub fn monthly_rate(annual_return: f64) -> f64 {
    if annual_return <= -0.99 {
        return -1.0 + 1e-9;
    }
    (1.0 + annual_return).powf(1.0 / 12.0) - 1.0
}

pub fn future_value(current: f64, monthly_contribution: f64, months: u32, rate: f64) -> f64 {
    let n = months as f64;
    if rate.abs() < 1e-12 {
        return current + monthly_contribution * n;
    }
    let growth = (1.0 + rate).powf(n);
    current * growth + monthly_contribution * (growth - 1.0) / rate
}

/// Level monthly payment that, with `current` compounding alongside, reaches
/// `target` after `months`.
pub fn required_monthly_contribution(target: f64, current: f64, months: u32, rate: f64) -> f64 {
    let months = months.max(1);
    let n = months as f64;
    if rate.abs() < 1e-12 {
        return ((target - current) / n).max(0.0);
    }
    let growth = (1.0 + rate).powf(n);
    let shortfall = target - current * growth;
    if shortfall <= 0.0 {
        return 0.0;
    }
    let annuity_factor = (growth - 1.0) / rate;
    if annuity_factor <= 1e-12 {
        shortfall
    } else {
        shortfall / annuity_factor
    }
}

/// First month the balance reaches `target`, or `None` within `cap` months.
pub fn months_to_reach(
    target: f64,
    current: f64,
    monthly_contribution: f64,
    rate: f64,
    cap: u32,
) -> Option<u32> {
    if current >= target {
        return Some(0);
    }
    let mut balance = current;
    for month in 1..=cap {
        balance = balance * (1.0 + rate) + monthly_contribution;
        if balance >= target {
            return Some(month);
        }
    }
    None
}

/// Checks the goal and resolves its horizon to whole months, at most
/// `max_horizon_months`.
pub fn validate_goal(
    goal: &Goal,
    profile: &Profile,
    max_horizon_months: u32,
) -> Result<u32, PlanError> {
    let invalid = |reason: &str| PlanError::invalid_goal(&goal.id, reason);

    if goal.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    for (name, value) in [
        ("target_amount", goal.target_amount),
        ("current_amount", goal.current_amount),
        ("monthly_contribution", goal.monthly_contribution),
    ] {
        if !value.is_finite() {
            return Err(invalid(&format!("{name} must be finite")));
        }
        if value < 0.0 {
            return Err(invalid(&format!("{name} must be >= 0")));
        }
    }
    if !goal.asset_allocation.is_normalized() {
        return Err(invalid(&format!(
            "asset_allocation weights must sum to 1.0 (got {:.4})",
            goal.asset_allocation.total()
        )));
    }
    let months = goal
        .time_horizon
        .months_from(profile.as_of)
        .ok_or_else(|| invalid("time_horizon must lie in the future"))?;
    if months > max_horizon_months {
        return Err(invalid(&format!(
            "time_horizon of {months} months exceeds the {max_horizon_months} month limit"
        )));
    }
    Ok(months)
}

pub fn analyze_gap(
    goal: &Goal,
    profile: &Profile,
    config: &PlannerConfig,
) -> Result<GapResult, PlanError> {
    let months_remaining =
        validate_goal(goal, profile, config.projection.max_projection_months)?;

    let gap_amount = (goal.target_amount - goal.current_amount).max(0.0);
    let gap_percentage = if goal.target_amount > 0.0 {
        gap_amount / goal.target_amount
    } else {
        0.0
    };

    let rate = monthly_rate(
        goal.asset_allocation
            .expected_return(&config.projection.expected_returns),
    );
    let required = required_monthly_contribution(
        goal.target_amount,
        goal.current_amount,
        months_remaining,
        rate,
    );
    let capacity_gap = (required - goal.monthly_contribution).max(0.0);

    let cap = config.projection.max_projection_months;
    let months_needed = months_to_reach(
        goal.target_amount,
        goal.current_amount,
        goal.monthly_contribution,
        rate,
        cap,
    )
    .unwrap_or(cap.max(months_remaining));
    let timeframe_gap = months_needed.saturating_sub(months_remaining);

    Ok(GapResult {
        goal_id: goal.id.clone(),
        target_amount: goal.target_amount,
        current_amount: goal.current_amount,
        gap_amount,
        gap_percentage,
        months_remaining,
        timeframe_gap,
        required_monthly_contribution: required,
        capacity_gap,
        severity: config.severity.classify(gap_percentage),
    })
}
