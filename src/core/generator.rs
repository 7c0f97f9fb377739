use tracing::debug;

use super::config::PlannerConfig;
use super::gap::{monthly_rate, required_monthly_contribution};
use super::oracle::{GoalConfiguration, OracleClient};
use super::suitability::{ScoringContext, SuitabilityScorer, confidence_for};
use super::types::{
    AdjustmentImpact, AdjustmentOption, AdjustmentPatch, AssetClass, Axis, GapResult, Goal,
    OptionKind, Profile,
};

/// Everything known about one goal before adjustments are proposed.
pub struct GenerationContext<'a> {
    pub goal: &'a Goal,
    pub profile: &'a Profile,
    pub gap: &'a GapResult,
    pub baseline: &'a GoalConfiguration,
    pub baseline_probability: f64,
    pub baseline_degraded: bool,
}

impl GenerationContext<'_> {
    fn scoring(&self) -> ScoringContext<'_> {
        ScoringContext {
            goal: self.goal,
            gap: self.gap,
            profile: self.profile,
        }
    }
}

pub struct AdjustmentGenerator<'a> {
    config: &'a PlannerConfig,
    oracle: &'a OracleClient,
    scorer: SuitabilityScorer<'a>,
}

impl<'a> AdjustmentGenerator<'a> {
    pub fn new(config: &'a PlannerConfig, oracle: &'a OracleClient) -> Self {
        Self {
            config,
            oracle,
            scorer: SuitabilityScorer::new(&config.categories),
        }
    }

    pub fn target_reduction_candidate(&self, ctx: &GenerationContext<'_>) -> Option<AdjustmentPatch> {
        let goal = ctx.goal;
        if !self.config.categories.allows(&goal.category, Axis::TargetAmount) {
            return None;
        }
        if ctx.gap.gap_amount <= 0.0 {
            return None;
        }
        let adj = &self.config.adjustment;
        let reduction = (ctx.gap.gap_percentage / 2.0)
            .min(adj.max_target_reduction)
            .max(adj.min_target_reduction);
        Some(AdjustmentPatch {
            target_amount: Some(goal.target_amount * (1.0 - reduction)),
            ..AdjustmentPatch::default()
        })
    }

    pub fn timeframe_candidate(&self, ctx: &GenerationContext<'_>) -> Option<AdjustmentPatch> {
        let goal = ctx.goal;
        if goal.has_fixed_deadline
            || !self.config.categories.allows(&goal.category, Axis::Timeframe)
        {
            return None;
        }
        let adj = &self.config.adjustment;
        let extension = (adj.extension_factor * ctx.gap.timeframe_gap as f64)
            .clamp(adj.min_extension_months as f64, adj.max_extension_months as f64)
            .ceil() as u32;
        if extension == 0 {
            return None;
        }
        Some(AdjustmentPatch {
            horizon_months: Some(ctx.gap.months_remaining.saturating_add(extension)),
            ..AdjustmentPatch::default()
        })
    }

    pub fn contribution_candidate(&self, ctx: &GenerationContext<'_>) -> Option<AdjustmentPatch> {
        let goal = ctx.goal;
        if !self.config.categories.allows(&goal.category, Axis::Contribution) {
            return None;
        }
        let adj = &self.config.adjustment;
        let increase = ctx
            .gap
            .capacity_gap
            .min(adj.max_contribution_increase_percent * ctx.profile.monthly_income);
        let threshold = adj
            .min_contribution_increase
            .max(adj.min_contribution_increase_fraction * goal.monthly_contribution);
        if increase.is_nan() || increase <= 0.0 || increase < threshold {
            return None;
        }
        Some(AdjustmentPatch {
            monthly_contribution: Some(goal.monthly_contribution + increase),
            ..AdjustmentPatch::default()
        })
    }

    pub fn allocation_candidate(&self, ctx: &GenerationContext<'_>) -> Option<AdjustmentPatch> {
        let goal = ctx.goal;
        if !self.config.categories.allows(&goal.category, Axis::Allocation) {
            return None;
        }
        let adj = &self.config.adjustment;
        let equity = goal.asset_allocation.weight(AssetClass::Equity);
        let desired = (equity + adj.equity_shift_for(ctx.gap.months_remaining))
            .min(adj.max_equity)
            .max(adj.min_equity);
        let delta = (desired - equity).min(adj.max_equity_shift);
        if delta < 0.01 {
            return None;
        }
        Some(AdjustmentPatch {
            asset_allocation: Some(goal.asset_allocation.shift_equity(delta)),
            ..AdjustmentPatch::default()
        })
    }

    pub fn candidate_patches(&self, ctx: &GenerationContext<'_>) -> Vec<AdjustmentPatch> {
        [
            self.target_reduction_candidate(ctx),
            self.timeframe_candidate(ctx),
            self.contribution_candidate(ctx),
            self.allocation_candidate(ctx),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Single-axis options, each simulated once.
    pub async fn generate(&self, ctx: &GenerationContext<'_>) -> Vec<AdjustmentOption> {
        let patches = self.candidate_patches(ctx);
        debug!(
            goal_id = %ctx.goal.id,
            candidates = patches.len(),
            "generated single-axis candidates"
        );
        let mut options = Vec::with_capacity(patches.len());
        for patch in patches {
            options.push(self.evaluate(ctx, patch, OptionKind::Single).await);
        }
        options
    }

    /// Two- and three-axis compositions of the given single options. Each
    /// composite is simulated with a fresh oracle call on the merged
    /// configuration; single-axis deltas are never summed.
    pub async fn generate_combined(
        &self,
        ctx: &GenerationContext<'_>,
        singles: &[AdjustmentOption],
    ) -> Vec<AdjustmentOption> {
        let mut patches: Vec<AdjustmentPatch> = Vec::new();
        let n = singles.len();
        for i in 0..n {
            for j in (i + 1)..n {
                patches.push(singles[i].new_value.merge(&singles[j].new_value));
                for k in (j + 1)..n {
                    patches.push(
                        singles[i]
                            .new_value
                            .merge(&singles[j].new_value)
                            .merge(&singles[k].new_value),
                    );
                }
            }
        }
        patches.retain(|patch| patch.axes().len() > 1);
        patches.sort_by_key(|patch| patch.axes().len());

        debug!(
            goal_id = %ctx.goal.id,
            candidates = patches.len(),
            "generated combined candidates"
        );
        let mut options = Vec::with_capacity(patches.len());
        for patch in patches {
            options.push(self.evaluate(ctx, patch, OptionKind::Combined).await);
        }
        options
    }

    async fn evaluate(
        &self,
        ctx: &GenerationContext<'_>,
        patch: AdjustmentPatch,
        kind: OptionKind,
    ) -> AdjustmentOption {
        let candidate = ctx.baseline.apply(&patch);
        let estimate = self.oracle.probability(&candidate, ctx.profile).await;
        let degraded = estimate.degraded || ctx.baseline_degraded;
        let axes = patch.axes();

        let monthly_budget_impact = self.monthly_budget_impact(ctx, &candidate);
        let impact = AdjustmentImpact {
            probability_change: estimate.probability - ctx.baseline_probability,
            monthly_budget_impact,
            total_budget_impact: monthly_budget_impact * candidate.horizon_months as f64,
        };

        AdjustmentOption {
            kind,
            description: describe(ctx, &patch),
            impact,
            confidence_score: confidence_for(&axes, degraded),
            suitability_score: self.scorer.score(&patch, &ctx.scoring()),
            degraded,
            axes,
            new_value: patch,
        }
    }

    /// Extra monthly outlay plus the change in the contribution needed to hit
    /// the (possibly changed) target on the (possibly changed) horizon at the
    /// goal's current expected return.
    fn monthly_budget_impact(&self, ctx: &GenerationContext<'_>, candidate: &GoalConfiguration) -> f64 {
        let baseline = ctx.baseline;
        let contribution_delta = candidate.monthly_contribution - baseline.monthly_contribution;

        if candidate.target_amount == baseline.target_amount
            && candidate.horizon_months == baseline.horizon_months
        {
            return contribution_delta;
        }
        let rate = monthly_rate(
            baseline
                .asset_allocation
                .expected_return(&self.config.projection.expected_returns),
        );
        let required_after = required_monthly_contribution(
            candidate.target_amount,
            baseline.current_amount,
            candidate.horizon_months,
            rate,
        );
        contribution_delta + (required_after - ctx.gap.required_monthly_contribution)
    }
}

fn describe(ctx: &GenerationContext<'_>, patch: &AdjustmentPatch) -> String {
    let goal = ctx.goal;
    let mut parts = Vec::new();
    if let Some(new_target) = patch.target_amount {
        let pct = if goal.target_amount > 0.0 {
            (1.0 - new_target / goal.target_amount) * 100.0
        } else {
            0.0
        };
        parts.push(format!(
            "reduce target from {:.0} to {:.0} ({pct:.0}% lower)",
            goal.target_amount, new_target
        ));
    }
    if let Some(months) = patch.horizon_months {
        parts.push(format!(
            "extend timeline by {} months to {months} months",
            months.saturating_sub(ctx.gap.months_remaining)
        ));
    }
    if let Some(contribution) = patch.monthly_contribution {
        parts.push(format!(
            "increase monthly contribution by {:.0} to {contribution:.0}",
            contribution - goal.monthly_contribution
        ));
    }
    if let Some(allocation) = &patch.asset_allocation {
        parts.push(format!(
            "shift equity allocation from {:.0}% to {:.0}%",
            goal.asset_allocation.weight(AssetClass::Equity) * 100.0,
            allocation.weight(AssetClass::Equity) * 100.0
        ));
    }

    let mut description = parts.join(", then ");
    if let Some(first) = description.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gap::analyze_gap;
    use crate::core::testing::{AxisStubOracle, scenario_config, scenario_goal, scenario_profile};
    use crate::core::types::AssetAllocation;
    use std::sync::Arc;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    struct Fixture {
        config: PlannerConfig,
        goal: Goal,
        profile: Profile,
        gap: GapResult,
        baseline: GoalConfiguration,
        oracle: OracleClient,
    }

    impl Fixture {
        fn new(goal: Goal) -> Self {
            let config = scenario_config();
            let profile = scenario_profile();
            let gap = analyze_gap(&goal, &profile, &config).expect("valid goal");
            let baseline = GoalConfiguration::from_goal(&goal, gap.months_remaining);
            let oracle = OracleClient::from_config(
                Arc::new(AxisStubOracle::scenario(baseline.clone())),
                &config,
            );
            Self {
                config,
                goal,
                profile,
                gap,
                baseline,
                oracle,
            }
        }

        fn ctx(&self) -> GenerationContext<'_> {
            GenerationContext {
                goal: &self.goal,
                profile: &self.profile,
                gap: &self.gap,
                baseline: &self.baseline,
                baseline_probability: 0.65,
                baseline_degraded: false,
            }
        }
    }

    #[test]
    fn target_reduction_is_clamped_to_configured_maximum() {
        let fx = Fixture::new(scenario_goal());
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator
            .target_reduction_candidate(&fx.ctx())
            .expect("reduction expected");
        assert_approx(patch.target_amount.expect("target set"), 900_000.0);
    }

    #[test]
    fn small_gap_still_reduces_by_minimum_meaningful_step() {
        let mut goal = scenario_goal();
        goal.current_amount = 960_000.0;
        let fx = Fixture::new(goal);
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator
            .target_reduction_candidate(&fx.ctx())
            .expect("reduction expected");
        assert_approx(patch.target_amount.expect("target set"), 950_000.0);
    }

    #[test]
    fn emergency_fund_never_reduces_target() {
        let mut goal = scenario_goal();
        goal.category = "emergency_fund".into();
        let fx = Fixture::new(goal);
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        assert!(generator.target_reduction_candidate(&fx.ctx()).is_none());
        assert!(generator.allocation_candidate(&fx.ctx()).is_none());
    }

    #[test]
    fn fixed_deadline_skips_timeframe() {
        let mut goal = scenario_goal();
        goal.has_fixed_deadline = true;
        let fx = Fixture::new(goal);
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        assert!(generator.timeframe_candidate(&fx.ctx()).is_none());
    }

    #[test]
    fn timeframe_extension_is_bounded() {
        let fx = Fixture::new(scenario_goal());
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator.timeframe_candidate(&fx.ctx()).expect("extension");
        assert_eq!(patch.horizon_months, Some(240 + 24));

        let mut near = scenario_goal();
        near.current_amount = 999_500.0;
        let fx = Fixture::new(near);
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator.timeframe_candidate(&fx.ctx()).expect("extension");
        assert_eq!(patch.horizon_months, Some(240 + 3));
    }

    #[test]
    fn timeframe_extension_saturates_at_u32_max() {
        let mut fx = Fixture::new(scenario_goal());
        fx.gap.months_remaining = u32::MAX - 1;
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator.timeframe_candidate(&fx.ctx()).expect("extension");
        assert_eq!(patch.horizon_months, Some(u32::MAX));
    }

    #[test]
    fn contribution_increase_is_capped_by_income_share() {
        let fx = Fixture::new(scenario_goal());
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator.contribution_candidate(&fx.ctx()).expect("increase");
        assert_approx(patch.monthly_contribution.expect("set"), 1_500.0);
    }

    #[test]
    fn tiny_contribution_increase_is_rejected() {
        let mut goal = scenario_goal();
        goal.monthly_contribution = 2_900.0;
        let fx = Fixture::new(goal);
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        // capacity gap ~16.67 is below 5% of the current contribution
        assert!(generator.contribution_candidate(&fx.ctx()).is_none());
    }

    #[test]
    fn allocation_shift_respects_equity_cap_and_rebalances_debt_first() {
        let mut goal = scenario_goal();
        goal.asset_allocation = AssetAllocation::new([
            (AssetClass::Equity, 0.70),
            (AssetClass::Debt, 0.05),
            (AssetClass::Cash, 0.15),
            (AssetClass::Gold, 0.10),
        ]);
        let fx = Fixture::new(goal);
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let patch = generator.allocation_candidate(&fx.ctx()).expect("shift");
        let allocation = patch.asset_allocation.expect("allocation set");
        assert_approx(allocation.weight(AssetClass::Equity), 0.80);
        assert_approx(allocation.weight(AssetClass::Debt), 0.0);
        assert_approx(allocation.weight(AssetClass::Cash), 0.10);
        assert_approx(allocation.weight(AssetClass::Gold), 0.10);
        assert!(allocation.is_normalized());
    }

    #[tokio::test]
    async fn single_options_carry_simulated_deltas_and_budget_impacts() {
        let fx = Fixture::new(scenario_goal());
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let options = generator.generate(&fx.ctx()).await;

        let by_axis = |axis: Axis| {
            options
                .iter()
                .find(|o| o.axes == vec![axis])
                .unwrap_or_else(|| panic!("missing {axis:?} option"))
        };
        let target = by_axis(Axis::TargetAmount);
        assert_approx(target.impact.probability_change, 0.10);
        assert!(target.impact.monthly_budget_impact < 0.0);
        assert_approx(target.impact.monthly_budget_impact, -100_000.0 / 240.0);

        let timeframe = by_axis(Axis::Timeframe);
        assert_approx(timeframe.impact.probability_change, 0.12);
        assert!(timeframe.impact.monthly_budget_impact < 0.0);
        assert_approx(
            timeframe.impact.total_budget_impact,
            timeframe.impact.monthly_budget_impact * 264.0,
        );

        let contribution = by_axis(Axis::Contribution);
        assert_approx(contribution.impact.probability_change, 0.08);
        assert_approx(contribution.impact.monthly_budget_impact, 500.0);
        assert_approx(contribution.impact.total_budget_impact, 500.0 * 240.0);

        for option in &options {
            assert_eq!(option.kind, OptionKind::Single);
            assert!((0.1..=0.9).contains(&option.suitability_score));
            assert!(!option.degraded);
        }
    }

    #[tokio::test]
    async fn combined_options_use_fresh_simulation() {
        let fx = Fixture::new(scenario_goal());
        let generator = AdjustmentGenerator::new(&fx.config, &fx.oracle);
        let singles = generator.generate(&fx.ctx()).await;
        let combined = generator.generate_combined(&fx.ctx(), &singles).await;

        let pair = combined
            .iter()
            .find(|o| o.axes == vec![Axis::TargetAmount, Axis::Timeframe])
            .expect("target+timeframe pair");
        // stub adds a composite bonus, so the delta differs from the naive sum
        assert_approx(pair.impact.probability_change, 0.10 + 0.12 + 0.01);
        assert!(pair.description.starts_with("Reduce target"));
        assert!(combined.iter().all(|o| o.kind == OptionKind::Combined));
        assert!(combined.iter().any(|o| o.axes.len() == 3));
    }
}
