use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::PlanError;
use super::types::{AssetClass, Axis, ClassBounds, GoalCategory, Priority, Severity};

/// Behaviour of one goal category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProfile {
    pub priority_weight: f64,
    /// 0 = neutral, 1 = the amount and date carry strong family or social
    /// meaning and should not be bargained down.
    pub cultural_sensitivity: f64,
    pub allowed_axes: Vec<Axis>,
}

impl CategoryProfile {
    pub fn new(priority_weight: f64, cultural_sensitivity: f64, allowed_axes: &[Axis]) -> Self {
        Self {
            priority_weight,
            cultural_sensitivity,
            allowed_axes: allowed_axes.to_vec(),
        }
    }

    pub fn allows(&self, axis: Axis) -> bool {
        self.allowed_axes.contains(&axis)
    }
}

const ALL_AXES: [Axis; 4] = [
    Axis::TargetAmount,
    Axis::Timeframe,
    Axis::Contribution,
    Axis::Allocation,
];

/// Category registry. Passed in explicitly; unknown categories resolve to
/// `default_profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryTable {
    pub categories: BTreeMap<GoalCategory, CategoryProfile>,
    pub default_profile: CategoryProfile,
}

impl CategoryTable {
    pub fn lookup(&self, category: &GoalCategory) -> &CategoryProfile {
        self.categories
            .get(category)
            .unwrap_or(&self.default_profile)
    }

    pub fn allows(&self, category: &GoalCategory, axis: Axis) -> bool {
        self.lookup(category).allows(axis)
    }

    pub fn with_category(mut self, name: &str, profile: CategoryProfile) -> Self {
        self.categories.insert(GoalCategory::new(name), profile);
        self
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        use Axis::{Allocation, Contribution, TargetAmount, Timeframe};
        let all = ALL_AXES.to_vec();
        let entries = [
            ("emergency_fund", 1.0, 0.4, vec![Timeframe, Contribution]),
            ("retirement", 0.9, 0.8, all.clone()),
            ("education", 0.85, 0.9, all.clone()),
            ("healthcare", 0.85, 0.6, vec![Timeframe, Contribution, Allocation]),
            ("debt_repayment", 0.8, 0.3, vec![Timeframe, Contribution]),
            ("home_purchase", 0.75, 0.5, all.clone()),
            ("wedding", 0.7, 0.9, all.clone()),
            ("marriage", 0.7, 0.9, all.clone()),
            ("business", 0.6, 0.2, all.clone()),
            ("home_improvement", 0.5, 0.2, all.clone()),
            ("vehicle", 0.5, 0.1, all.clone()),
            ("travel", 0.35, 0.1, vec![TargetAmount, Timeframe, Contribution]),
        ];
        let categories = entries
            .into_iter()
            .map(|(name, weight, sensitivity, axes)| {
                (
                    GoalCategory::new(name),
                    CategoryProfile::new(weight, sensitivity, &axes),
                )
            })
            .collect();
        Self {
            categories,
            default_profile: CategoryProfile::new(0.5, 0.2, &ALL_AXES),
        }
    }
}

/// Upper bounds (exclusive) of the gap-percentage bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBands {
    pub manageable_below: f64,
    pub moderate_below: f64,
    pub significant_below: f64,
}

impl SeverityBands {
    pub fn classify(&self, gap_percentage: f64) -> Severity {
        if gap_percentage < self.manageable_below {
            Severity::Manageable
        } else if gap_percentage < self.moderate_below {
            Severity::Moderate
        } else if gap_percentage < self.significant_below {
            Severity::Significant
        } else {
            Severity::Severe
        }
    }
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            manageable_below: 0.10,
            moderate_below: 0.25,
            significant_below: 0.40,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    #[default]
    Suitability,
    Impact,
    Blended,
}

/// Equity increase permitted once the horizon reaches `min_months`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonShift {
    pub min_months: u32,
    pub equity_shift: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentConfig {
    pub default_target_probability: f64,
    pub min_target_reduction: f64,
    pub max_target_reduction: f64,
    pub extension_factor: f64,
    pub min_extension_months: u32,
    pub max_extension_months: u32,
    pub max_contribution_increase_percent: f64,
    pub min_contribution_increase: f64,
    pub min_contribution_increase_fraction: f64,
    pub min_equity: f64,
    pub max_equity: f64,
    pub max_equity_shift: f64,
    pub equity_ladder: Vec<HorizonShift>,
    pub min_probability_impact: f64,
    pub ranking_mode: RankingMode,
    pub enable_combined: bool,
}

impl AdjustmentConfig {
    /// Largest ladder step the horizon qualifies for, capped by the per-call
    /// maximum.
    pub fn equity_shift_for(&self, months: u32) -> f64 {
        self.equity_ladder
            .iter()
            .filter(|step| months >= step.min_months)
            .map(|step| step.equity_shift)
            .fold(0.0, f64::max)
            .min(self.max_equity_shift)
    }
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            default_target_probability: 0.80,
            min_target_reduction: 0.05,
            max_target_reduction: 0.20,
            extension_factor: 1.2,
            min_extension_months: 3,
            max_extension_months: 36,
            max_contribution_increase_percent: 0.15,
            min_contribution_increase: 500.0,
            min_contribution_increase_fraction: 0.05,
            min_equity: 0.20,
            max_equity: 0.80,
            max_equity_shift: 0.15,
            equity_ladder: vec![
                HorizonShift {
                    min_months: 36,
                    equity_shift: 0.05,
                },
                HorizonShift {
                    min_months: 84,
                    equity_shift: 0.10,
                },
                HorizonShift {
                    min_months: 180,
                    equity_shift: 0.15,
                },
            ],
            min_probability_impact: 0.01,
            ranking_mode: RankingMode::Suitability,
            enable_combined: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Expected annual nominal return per asset class.
    pub expected_returns: BTreeMap<AssetClass, f64>,
    /// Annual return volatility per asset class, used by the fallback estimator.
    pub expected_volatility: BTreeMap<AssetClass, f64>,
    pub max_projection_months: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            expected_returns: BTreeMap::from([
                (AssetClass::Equity, 0.11),
                (AssetClass::Debt, 0.07),
                (AssetClass::Cash, 0.04),
                (AssetClass::Gold, 0.08),
            ]),
            expected_volatility: BTreeMap::from([
                (AssetClass::Equity, 0.16),
                (AssetClass::Debt, 0.05),
                (AssetClass::Cash, 0.01),
                (AssetClass::Gold, 0.14),
            ]),
            max_projection_months: 1_200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityMultipliers {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl PriorityMultipliers {
    pub fn for_priority(&self, priority: Priority) -> f64 {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

impl Default for PriorityMultipliers {
    fn default() -> Self {
        Self {
            high: 1.5,
            medium: 1.0,
            low: 0.6,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementSource {
    /// Annuity formula over the configured expected returns.
    #[default]
    Analytic,
    /// Bisection against the probability oracle.
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub target_probability: f64,
    /// Upper search bound as a multiple of monthly income.
    pub search_max_income_multiple: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            target_probability: 0.80,
            search_max_income_multiple: 1.0,
            tolerance: 10.0,
            max_iterations: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub max_investment_fraction: f64,
    pub minimum_sip: f64,
    pub priority_multipliers: PriorityMultipliers,
    pub short_horizon_months: u32,
    pub short_horizon_boost: f64,
    pub long_horizon_months: u32,
    pub long_horizon_penalty: f64,
    pub requirement_source: RequirementSource,
    pub solver: SolverConfig,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_investment_fraction: 0.5,
            minimum_sip: 500.0,
            priority_multipliers: PriorityMultipliers::default(),
            short_horizon_months: 36,
            short_horizon_boost: 1.25,
            long_horizon_months: 240,
            long_horizon_penalty: 0.9,
            requirement_source: RequirementSource::Analytic,
            solver: SolverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    pub horizon_threshold_months: u32,
    pub affinity: Vec<[GoalCategory; 2]>,
    pub class_bounds: BTreeMap<AssetClass, ClassBounds>,
}

impl CombinerConfig {
    pub fn has_affinity(&self, a: &GoalCategory, b: &GoalCategory) -> bool {
        self.affinity
            .iter()
            .any(|[x, y]| (x == a && y == b) || (x == b && y == a))
    }
}

impl Default for CombinerConfig {
    fn default() -> Self {
        let pair = |a: &str, b: &str| [GoalCategory::new(a), GoalCategory::new(b)];
        Self {
            horizon_threshold_months: 36,
            affinity: vec![
                pair("education", "wedding"),
                pair("education", "marriage"),
                pair("home_purchase", "home_improvement"),
                pair("retirement", "healthcare"),
                pair("vehicle", "travel"),
            ],
            class_bounds: BTreeMap::from([
                (AssetClass::Equity, ClassBounds { min: 0.10, max: 0.75 }),
                (AssetClass::Debt, ClassBounds { min: 0.10, max: 0.80 }),
                (AssetClass::Cash, ClassBounds { min: 0.0, max: 0.30 }),
                (AssetClass::Gold, ClassBounds { min: 0.0, max: 0.15 }),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub categories: CategoryTable,
    pub severity: SeverityBands,
    pub adjustment: AdjustmentConfig,
    pub projection: ProjectionConfig,
    pub allocation: AllocationConfig,
    pub combiner: CombinerConfig,
    pub oracle_timeout_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            categories: CategoryTable::default(),
            severity: SeverityBands::default(),
            adjustment: AdjustmentConfig::default(),
            projection: ProjectionConfig::default(),
            allocation: AllocationConfig::default(),
            combiner: CombinerConfig::default(),
            oracle_timeout_ms: 2_000,
        }
    }
}

impl PlannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, PlanError> {
        let config: PlannerConfig = serde_json::from_str(json)
            .map_err(|e| PlanError::InvalidConfig(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PlanError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            PlanError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let fail = |msg: &str| Err(PlanError::InvalidConfig(msg.to_string()));

        for (name, profile) in self
            .categories
            .categories
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(std::iter::once(("default", &self.categories.default_profile)))
        {
            if !profile.priority_weight.is_finite() || profile.priority_weight <= 0.0 {
                return Err(PlanError::InvalidConfig(format!(
                    "category '{name}' priority_weight must be > 0"
                )));
            }
            if !(0.0..=1.0).contains(&profile.cultural_sensitivity) {
                return Err(PlanError::InvalidConfig(format!(
                    "category '{name}' cultural_sensitivity must be between 0 and 1"
                )));
            }
        }

        let bands = &self.severity;
        if !(0.0 < bands.manageable_below
            && bands.manageable_below <= bands.moderate_below
            && bands.moderate_below <= bands.significant_below)
        {
            return fail("severity bands must be positive and ascending");
        }

        let adj = &self.adjustment;
        if !(0.0..=1.0).contains(&adj.default_target_probability) {
            return fail("default_target_probability must be between 0 and 1");
        }
        if !(0.0 < adj.min_target_reduction && adj.min_target_reduction <= adj.max_target_reduction)
            || adj.max_target_reduction >= 1.0
        {
            return fail("target reduction bounds must satisfy 0 < min <= max < 1");
        }
        if adj.min_extension_months > adj.max_extension_months {
            return fail("min_extension_months cannot exceed max_extension_months");
        }
        if !(0.0..=1.0).contains(&adj.max_contribution_increase_percent) {
            return fail("max_contribution_increase_percent must be between 0 and 1");
        }
        if !(0.0 <= adj.min_equity && adj.min_equity <= adj.max_equity && adj.max_equity <= 1.0) {
            return fail("equity bounds must satisfy 0 <= min <= max <= 1");
        }
        if !(0.0..=1.0).contains(&adj.max_equity_shift) {
            return fail("max_equity_shift must be between 0 and 1");
        }
        if adj.min_probability_impact < 0.0 {
            return fail("min_probability_impact must be >= 0");
        }

        let alloc = &self.allocation;
        if !(alloc.max_investment_fraction > 0.0 && alloc.max_investment_fraction <= 1.0) {
            return fail("max_investment_fraction must be in (0, 1]");
        }
        if alloc.minimum_sip < 0.0 {
            return fail("minimum_sip must be >= 0");
        }
        let m = alloc.priority_multipliers;
        if m.high <= 0.0 || m.medium <= 0.0 || m.low <= 0.0 {
            return fail("priority multipliers must be > 0");
        }
        if alloc.short_horizon_boost <= 0.0 || alloc.long_horizon_penalty <= 0.0 {
            return fail("horizon boost and penalty must be > 0");
        }
        if alloc.solver.tolerance <= 0.0 || alloc.solver.max_iterations == 0 {
            return fail("solver tolerance and max_iterations must be > 0");
        }

        let mut min_sum = 0.0;
        let mut max_sum = 0.0;
        for class in AssetClass::ALL {
            let b = self
                .combiner
                .class_bounds
                .get(&class)
                .copied()
                .unwrap_or_default();
            if !(0.0 <= b.min && b.min <= b.max && b.max <= 1.0) {
                return Err(PlanError::InvalidConfig(format!(
                    "bounds for {} must satisfy 0 <= min <= max <= 1",
                    class.as_str()
                )));
            }
            min_sum += b.min;
            max_sum += b.max;
        }
        if min_sum > 1.0 + 1e-9 || max_sum < 1.0 - 1e-9 {
            return fail("asset-class floors must sum to <= 1 and caps to >= 1");
        }

        if self.oracle_timeout_ms == 0 {
            return fail("oracle_timeout_ms must be > 0");
        }
        Ok(())
    }
}
