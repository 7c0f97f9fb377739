use tracing::debug;

use super::config::CombinerConfig;
use super::types::{AssetAllocation, CombineReason, CompoundStatus, CompoundStrategy, Goal};

/// A validated goal with its resolved horizon and allocation weight.
#[derive(Debug, Clone, Copy)]
pub struct CombinableGoal<'a> {
    pub goal: &'a Goal,
    pub horizon_months: u32,
    pub priority_weight: f64,
}

/// Category affinity is reported ahead of horizon proximity when both apply.
pub fn combine_reason(
    a: &CombinableGoal<'_>,
    b: &CombinableGoal<'_>,
    config: &CombinerConfig,
) -> Option<CombineReason> {
    if config.has_affinity(&a.goal.category, &b.goal.category) {
        return Some(CombineReason::CategoryAffinity);
    }
    if a.horizon_months.abs_diff(b.horizon_months) <= config.horizon_threshold_months {
        return Some(CombineReason::HorizonProximity);
    }
    None
}

pub fn merge_pair(
    a: &CombinableGoal<'_>,
    b: &CombinableGoal<'_>,
    reason: CombineReason,
    config: &CombinerConfig,
) -> CompoundStrategy {
    let members = [a, b];
    let total_target: f64 = members.iter().map(|m| m.goal.target_amount).sum();
    let total_current: f64 = members.iter().map(|m| m.goal.current_amount).sum();
    let total_monthly_contribution: f64 =
        members.iter().map(|m| m.goal.monthly_contribution).sum();
    let funded_ratio = if total_target > 0.0 {
        total_current / total_target
    } else {
        1.0
    };

    let asset_allocation = AssetAllocation::weighted_average(
        members
            .iter()
            .map(|m| (&m.goal.asset_allocation, m.priority_weight)),
    )
    .enforce_bounds(&config.class_bounds);

    CompoundStrategy {
        display_name: format!("{} + {}", a.goal.display_name(), b.goal.display_name()),
        goal_ids: vec![a.goal.id.clone(), b.goal.id.clone()],
        reason,
        horizon_months: a.horizon_months.max(b.horizon_months),
        earliest_deadline_months: a.horizon_months.min(b.horizon_months),
        current_status: CompoundStatus {
            total_target,
            total_current,
            total_monthly_contribution,
            funded_ratio,
        },
        asset_allocation,
    }
}

/// Greedy pairing in input order; a goal joins at most one strategy.
pub fn combine_goals(goals: &[CombinableGoal<'_>], config: &CombinerConfig) -> Vec<CompoundStrategy> {
    let mut used = vec![false; goals.len()];
    let mut strategies = Vec::new();

    for i in 0..goals.len() {
        if used[i] {
            continue;
        }
        for j in (i + 1)..goals.len() {
            if used[j] {
                continue;
            }
            if let Some(reason) = combine_reason(&goals[i], &goals[j], config) {
                used[i] = true;
                used[j] = true;
                strategies.push(merge_pair(&goals[i], &goals[j], reason, config));
                break;
            }
        }
    }

    debug!(
        goals = goals.len(),
        strategies = strategies.len(),
        "compound strategies formed"
    );
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::goal;
    use crate::core::types::AssetClass;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn combinable(goal: &Goal, months: u32) -> CombinableGoal<'_> {
        CombinableGoal {
            goal,
            horizon_months: months,
            priority_weight: 1.0,
        }
    }

    #[test]
    fn close_horizons_pair_up() {
        let a = goal("car", "vehicle", 20_000.0, 24);
        let b = goal("reno", "business", 30_000.0, 48);
        let goals = [combinable(&a, 24), combinable(&b, 48)];
        let strategies = combine_goals(&goals, &CombinerConfig::default());

        assert_eq!(strategies.len(), 1);
        let strategy = &strategies[0];
        assert_eq!(strategy.reason, CombineReason::HorizonProximity);
        assert_eq!(strategy.goal_ids, vec!["car".to_string(), "reno".to_string()]);
        assert_eq!(strategy.display_name, "car + reno");
        assert_eq!(strategy.horizon_months, 48);
        assert_eq!(strategy.earliest_deadline_months, 24);
        assert_approx(strategy.current_status.total_target, 50_000.0);
    }

    #[test]
    fn affinity_pairs_distant_horizons() {
        let mut a = goal("school", "education", 80_000.0, 60);
        a.name = "School fees".to_string();
        a.current_amount = 20_000.0;
        let b = goal("wedding", "Wedding", 40_000.0, 180);
        let goals = [combinable(&a, 60), combinable(&b, 180)];
        let strategies = combine_goals(&goals, &CombinerConfig::default());

        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].reason, CombineReason::CategoryAffinity);
        assert_eq!(strategies[0].display_name, "School fees + wedding");
        assert_approx(strategies[0].current_status.funded_ratio, 20_000.0 / 120_000.0);
    }

    #[test]
    fn unrelated_distant_goals_stay_apart() {
        let a = goal("trip", "travel", 5_000.0, 12);
        let b = goal("retire", "retirement", 1_000_000.0, 300);
        let goals = [combinable(&a, 12), combinable(&b, 300)];
        assert!(combine_goals(&goals, &CombinerConfig::default()).is_empty());
    }

    #[test]
    fn pairing_is_greedy_and_non_overlapping() {
        let a = goal("a", "business", 1.0, 12);
        let b = goal("b", "business", 1.0, 20);
        let c = goal("c", "business", 1.0, 30);
        let goals = [combinable(&a, 12), combinable(&b, 20), combinable(&c, 30)];
        let strategies = combine_goals(&goals, &CombinerConfig::default());
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].goal_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn combined_allocation_respects_class_caps() {
        let mut a = goal("a", "business", 1.0, 12);
        a.asset_allocation = AssetAllocation::single(AssetClass::Equity);
        let mut b = goal("b", "business", 1.0, 20);
        b.asset_allocation = AssetAllocation::new([(AssetClass::Equity, 0.9), (AssetClass::Gold, 0.1)]);
        let goals = [combinable(&a, 12), combinable(&b, 20)];
        let config = CombinerConfig::default();
        let strategy = &combine_goals(&goals, &config)[0];

        let allocation = &strategy.asset_allocation;
        assert!(allocation.is_normalized());
        assert!(allocation.weight(AssetClass::Equity) <= 0.75 + 1e-9);
        assert!(allocation.weight(AssetClass::Debt) >= 0.10 - 1e-9);
    }

    proptest! {
        #[test]
        fn merged_allocation_is_normalized(
            equity_a in 0.0f64..1.0,
            equity_b in 0.0f64..1.0,
            weight_a in 0.1f64..3.0,
            weight_b in 0.1f64..3.0,
        ) {
            let mut a = goal("a", "education", 1.0, 24);
            a.asset_allocation = AssetAllocation::new([
                (AssetClass::Equity, equity_a),
                (AssetClass::Debt, 1.0 - equity_a),
            ]);
            let mut b = goal("b", "wedding", 1.0, 200);
            b.asset_allocation = AssetAllocation::new([
                (AssetClass::Equity, equity_b),
                (AssetClass::Cash, 1.0 - equity_b),
            ]);
            let left = CombinableGoal { goal: &a, horizon_months: 24, priority_weight: weight_a };
            let right = CombinableGoal { goal: &b, horizon_months: 200, priority_weight: weight_b };
            let strategy = merge_pair(&left, &right, CombineReason::CategoryAffinity, &CombinerConfig::default());
            prop_assert!(strategy.asset_allocation.is_normalized());
        }
    }
}
