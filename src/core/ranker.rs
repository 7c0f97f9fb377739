use std::cmp::Ordering;

use tracing::debug;

use super::config::{AdjustmentConfig, RankingMode};
use super::error::PlanError;
use super::generator::{AdjustmentGenerator, GenerationContext};
use super::types::{AdjustmentOption, AdjustmentRecommendation};

pub struct RecommendationRanker<'a> {
    config: &'a AdjustmentConfig,
}

impl<'a> RecommendationRanker<'a> {
    pub fn new(config: &'a AdjustmentConfig) -> Self {
        Self { config }
    }

    fn is_meaningful(&self, option: &AdjustmentOption) -> bool {
        let change = option.impact.probability_change;
        change > 0.0 && change >= self.config.min_probability_impact
    }

    /// Drops options below the impact floor and orders the rest.
    pub fn rank(&self, options: Vec<AdjustmentOption>) -> Vec<AdjustmentOption> {
        let mut kept: Vec<AdjustmentOption> =
            options.into_iter().filter(|o| self.is_meaningful(o)).collect();
        let mode = self.config.ranking_mode;
        kept.sort_by(|a, b| compare(b, a, mode));
        kept
    }

    /// Combined options survive only when they beat every single option.
    pub fn filter_combined(
        &self,
        combined: Vec<AdjustmentOption>,
        best_single_change: f64,
    ) -> Vec<AdjustmentOption> {
        let kept = combined
            .into_iter()
            .filter(|o| o.impact.probability_change > best_single_change)
            .collect();
        self.rank(kept)
    }

    pub async fn recommend(
        &self,
        generator: &AdjustmentGenerator<'_>,
        ctx: &GenerationContext<'_>,
        target_probability: f64,
    ) -> AdjustmentRecommendation {
        let singles = self.rank(generator.generate(ctx).await);
        let best_single_change = best_change(&singles);

        let mut options = singles;
        if self.config.enable_combined
            && options.len() >= 2
            && needs_combined(best_single_change, ctx.baseline_probability, target_probability)
        {
            let combined = generator.generate_combined(ctx, &options).await;
            let combined = self.filter_combined(combined, best_single_change);
            debug!(
                goal_id = %ctx.goal.id,
                kept = combined.len(),
                "combined options after filtering"
            );
            options.extend(combined);
        }

        let degraded = ctx.baseline_degraded || options.iter().any(|o| o.degraded);
        let note = options.is_empty().then(|| {
            PlanError::NoViableAdjustment {
                goal_id: ctx.goal.id.clone(),
            }
            .to_string()
        });

        AdjustmentRecommendation {
            goal_id: ctx.goal.id.clone(),
            current_probability: ctx.baseline_probability,
            target_probability,
            adjustment_options: options,
            degraded,
            note,
        }
    }
}

/// True when no single option closes the distance to the target.
pub fn needs_combined(best_single_change: f64, current: f64, target: f64) -> bool {
    best_single_change < target - current
}

pub fn best_change(options: &[AdjustmentOption]) -> f64 {
    options
        .iter()
        .map(|o| o.impact.probability_change)
        .fold(0.0, f64::max)
}

fn compare(a: &AdjustmentOption, b: &AdjustmentOption, mode: RankingMode) -> Ordering {
    let impact = a.impact.probability_change;
    let other_impact = b.impact.probability_change;
    let suitability = a.suitability_score;
    let other_suitability = b.suitability_score;

    match mode {
        RankingMode::Suitability => suitability
            .total_cmp(&other_suitability)
            .then(impact.total_cmp(&other_impact)),
        RankingMode::Impact => impact
            .total_cmp(&other_impact)
            .then(suitability.total_cmp(&other_suitability)),
        RankingMode::Blended => (impact * suitability)
            .total_cmp(&(other_impact * other_suitability))
            .then(suitability.total_cmp(&other_suitability)),
    }
}
