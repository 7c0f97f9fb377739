use super::config::CategoryTable;
use super::types::{
    AdjustmentOption, AdjustmentPatch, AssetClass, Axis, GapResult, Goal, Profile, RiskTolerance,
};

pub const MIN_SUITABILITY: f64 = 0.1;
pub const MAX_SUITABILITY: f64 = 0.9;

const COMBINED_AXIS_PENALTY: f64 = 0.05;
const DEGRADED_CONFIDENCE_FACTOR: f64 = 0.6;
const COMBINED_CONFIDENCE_FACTOR: f64 = 0.9;

fn base_score(axis: Axis) -> f64 {
    match axis {
        Axis::TargetAmount => 0.55,
        Axis::Timeframe => 0.60,
        Axis::Contribution => 0.65,
        Axis::Allocation => 0.50,
    }
}

fn base_confidence(axis: Axis) -> f64 {
    match axis {
        Axis::TargetAmount => 0.90,
        Axis::Timeframe => 0.85,
        Axis::Contribution => 0.80,
        Axis::Allocation => 0.65,
    }
}

/// How reliable the reported probability change is: allocation shifts depend
/// on market assumptions, fallback estimates are coarse.
pub fn confidence_for(axes: &[Axis], degraded: bool) -> f64 {
    let mut confidence = axes
        .iter()
        .map(|axis| base_confidence(*axis))
        .fold(1.0, f64::min);
    if axes.len() > 1 {
        confidence *= COMBINED_CONFIDENCE_FACTOR;
    }
    if degraded {
        confidence *= DEGRADED_CONFIDENCE_FACTOR;
    }
    confidence.clamp(0.0, 1.0)
}

pub struct ScoringContext<'a> {
    pub goal: &'a Goal,
    pub gap: &'a GapResult,
    pub profile: &'a Profile,
}

pub struct SuitabilityScorer<'a> {
    categories: &'a CategoryTable,
}

impl<'a> SuitabilityScorer<'a> {
    pub fn new(categories: &'a CategoryTable) -> Self {
        Self { categories }
    }

    /// Score in `[MIN_SUITABILITY, MAX_SUITABILITY]`. Combined options score the
    /// mean of their axes minus a penalty per extra axis.
    pub fn score(&self, patch: &AdjustmentPatch, ctx: &ScoringContext<'_>) -> f64 {
        let axes = patch.axes();
        if axes.is_empty() {
            return MIN_SUITABILITY;
        }
        let mean = axes
            .iter()
            .map(|axis| self.axis_score(*axis, patch, ctx))
            .sum::<f64>()
            / axes.len() as f64;
        let penalty = COMBINED_AXIS_PENALTY * (axes.len() - 1) as f64;
        (mean - penalty).clamp(MIN_SUITABILITY, MAX_SUITABILITY)
    }

    pub fn rescore(&self, option: &AdjustmentOption, ctx: &ScoringContext<'_>) -> AdjustmentOption {
        option.with_suitability(self.score(&option.new_value, ctx))
    }

    fn axis_score(&self, axis: Axis, patch: &AdjustmentPatch, ctx: &ScoringContext<'_>) -> f64 {
        let sensitivity = self
            .categories
            .lookup(&ctx.goal.category)
            .cultural_sensitivity;
        let profile = ctx.profile;
        let is_retirement = ctx.goal.category.as_str() == "retirement";

        let mut score = base_score(axis);
        match axis {
            Axis::TargetAmount => {
                score -= 0.25 * sensitivity;
                let reduction = patch
                    .target_amount
                    .filter(|_| ctx.goal.target_amount > 0.0)
                    .map(|new_target| 1.0 - new_target / ctx.goal.target_amount)
                    .unwrap_or(0.0);
                score -= ((reduction - 0.10) * 1.5).clamp(0.0, 0.2);
                score += match profile.risk_tolerance {
                    RiskTolerance::Conservative => 0.05,
                    RiskTolerance::Moderate => 0.0,
                    RiskTolerance::Aggressive => -0.05,
                };
            }
            Axis::Timeframe => {
                score -= 0.20 * sensitivity;
                let extension = patch
                    .horizon_months
                    .map(|months| months.saturating_sub(ctx.gap.months_remaining))
                    .unwrap_or(0) as f64;
                score -= ((extension - 24.0) / 120.0).clamp(0.0, 0.2);
                if profile.risk_tolerance == RiskTolerance::Conservative {
                    score += 0.05;
                }
                if is_retirement {
                    if profile.age >= 60 {
                        score -= 0.25;
                    } else if profile.age >= 50 || profile.life_stage.near_retirement {
                        score -= 0.15;
                    }
                }
            }
            Axis::Contribution => {
                score += 0.15 * sensitivity;
                let increase = patch
                    .monthly_contribution
                    .map(|c| c - ctx.goal.monthly_contribution)
                    .unwrap_or(0.0);
                let income_share = if profile.monthly_income > 0.0 {
                    increase / profile.monthly_income
                } else {
                    1.0
                };
                score -= ((income_share - 0.10) * 2.0).clamp(0.0, 0.2);
                if profile.risk_tolerance == RiskTolerance::Aggressive {
                    score += 0.05;
                }
                if profile.life_stage.has_dependents {
                    score -= 0.05;
                }
                if profile.life_stage.single_income {
                    score -= 0.05;
                }
            }
            Axis::Allocation => {
                let shift = patch
                    .asset_allocation
                    .as_ref()
                    .map(|a| {
                        a.weight(AssetClass::Equity)
                            - ctx.goal.asset_allocation.weight(AssetClass::Equity)
                    })
                    .unwrap_or(0.0);
                if shift > 0.10 {
                    score -= 0.05;
                }
                score += match profile.risk_tolerance {
                    RiskTolerance::Conservative => -0.15,
                    RiskTolerance::Moderate => 0.0,
                    RiskTolerance::Aggressive => 0.10,
                };
                if profile.age < 35 {
                    score += 0.05;
                } else if profile.age >= 55 || profile.life_stage.near_retirement {
                    score -= 0.10;
                }
                if ctx.gap.months_remaining < 60 {
                    score -= 0.10;
                }
            }
        }
        score
    }
}
