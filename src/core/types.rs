use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Debt,
    Cash,
    Gold,
}

impl AssetClass {
    pub const ALL: [AssetClass; 4] = [
        AssetClass::Equity,
        AssetClass::Debt,
        AssetClass::Cash,
        AssetClass::Gold,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Debt => "debt",
            AssetClass::Cash => "cash",
            AssetClass::Gold => "gold",
        }
    }
}

/// Inclusive weight bounds for one asset class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for ClassBounds {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Asset-class weights. Every transformation returns a new value whose
/// weights sum to 1.0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetAllocation(BTreeMap<AssetClass, f64>);

impl AssetAllocation {
    pub fn new(weights: impl IntoIterator<Item = (AssetClass, f64)>) -> Self {
        let mut map = BTreeMap::new();
        for (class, weight) in weights {
            *map.entry(class).or_insert(0.0) += weight;
        }
        Self(map)
    }

    pub fn single(class: AssetClass) -> Self {
        Self::new([(class, 1.0)])
    }

    pub fn weight(&self, class: AssetClass) -> f64 {
        self.0.get(&class).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetClass, f64)> + '_ {
        self.0.iter().map(|(class, weight)| (*class, *weight))
    }

    pub fn is_normalized(&self) -> bool {
        self.0.values().all(|w| w.is_finite() && *w >= -WEIGHT_TOLERANCE)
            && (self.total() - 1.0).abs() <= WEIGHT_TOLERANCE
    }

    pub fn normalized(&self) -> Self {
        let cleaned: BTreeMap<AssetClass, f64> = self
            .0
            .iter()
            .map(|(class, w)| (*class, if w.is_finite() { w.max(0.0) } else { 0.0 }))
            .collect();
        let total: f64 = cleaned.values().sum();
        if total <= 1e-12 {
            return Self::single(AssetClass::Cash);
        }
        Self(
            cleaned
                .into_iter()
                .map(|(class, w)| (class, w / total))
                .collect(),
        )
    }

    /// Moves `delta` of weight into equity. The freed weight is taken from
    /// debt first, then cash, then gold. A negative delta moves equity into debt.
    pub fn shift_equity(&self, delta: f64) -> Self {
        let base = self.normalized();
        let mut weights: BTreeMap<AssetClass, f64> =
            AssetClass::ALL.iter().map(|c| (*c, base.weight(*c))).collect();

        if delta < 0.0 {
            let moved = (-delta).min(weights[&AssetClass::Equity]);
            *weights.entry(AssetClass::Equity).or_insert(0.0) -= moved;
            *weights.entry(AssetClass::Debt).or_insert(0.0) += moved;
        } else {
            let mut remaining = delta;
            for class in [AssetClass::Debt, AssetClass::Cash, AssetClass::Gold] {
                if remaining <= 0.0 {
                    break;
                }
                let available = weights[&class];
                let take = available.min(remaining);
                *weights.entry(class).or_insert(0.0) -= take;
                remaining -= take;
            }
            *weights.entry(AssetClass::Equity).or_insert(0.0) += delta - remaining;
        }

        weights.retain(|_, w| *w > 1e-12);
        Self(weights).normalized()
    }

    /// Weighted average of several allocations; items with non-positive
    /// weight are ignored.
    pub fn weighted_average<'a>(items: impl IntoIterator<Item = (&'a AssetAllocation, f64)>) -> Self {
        let mut acc: BTreeMap<AssetClass, f64> = BTreeMap::new();
        let mut total_weight = 0.0;
        for (allocation, weight) in items {
            if weight.is_nan() || weight <= 0.0 {
                continue;
            }
            total_weight += weight;
            for (class, w) in allocation.normalized().iter() {
                *acc.entry(class).or_insert(0.0) += w * weight;
            }
        }
        if total_weight <= 0.0 {
            return Self::single(AssetClass::Cash);
        }
        Self(acc).normalized()
    }

    /// Clamps every class into its bounds. Excess above a cap goes to the
    /// classes still under their cap in proportion to their headroom; a
    /// shortfall below a floor is taken from the classes above their floor in
    /// proportion to their surplus.
    pub fn enforce_bounds(&self, bounds: &BTreeMap<AssetClass, ClassBounds>) -> Self {
        let base = self.normalized();
        let bound_of = |class: AssetClass| bounds.get(&class).copied().unwrap_or_default();
        let mut weights: BTreeMap<AssetClass, f64> =
            AssetClass::ALL.iter().map(|c| (*c, base.weight(*c))).collect();

        let mut excess = 0.0;
        for class in AssetClass::ALL {
            let cap = bound_of(class).max;
            let w = weights[&class];
            if w > cap {
                excess += w - cap;
                weights.insert(class, cap);
            }
        }
        if excess > 1e-12 {
            let headroom: Vec<(AssetClass, f64)> = AssetClass::ALL
                .iter()
                .map(|c| (*c, (bound_of(*c).max - weights[c]).max(0.0)))
                .filter(|(_, room)| *room > 1e-12)
                .collect();
            let total_room: f64 = headroom.iter().map(|(_, room)| room).sum();
            if total_room > 0.0 {
                let give = excess.min(total_room);
                for (class, room) in headroom {
                    *weights.entry(class).or_insert(0.0) += give * room / total_room;
                }
            }
        }

        let mut shortfall = 0.0;
        for class in AssetClass::ALL {
            let floor = bound_of(class).min;
            let w = weights[&class];
            if w < floor {
                shortfall += floor - w;
                weights.insert(class, floor);
            }
        }
        if shortfall > 1e-12 {
            let surplus: Vec<(AssetClass, f64)> = AssetClass::ALL
                .iter()
                .map(|c| (*c, (weights[c] - bound_of(*c).min).max(0.0)))
                .filter(|(_, room)| *room > 1e-12)
                .collect();
            let total_surplus: f64 = surplus.iter().map(|(_, room)| room).sum();
            if total_surplus > 0.0 {
                let take = shortfall.min(total_surplus);
                for (class, room) in surplus {
                    *weights.entry(class).or_insert(0.0) -= take * room / total_surplus;
                }
            }
        }

        weights.retain(|_, w| *w > 1e-12);
        Self(weights).normalized()
    }

    /// Weight-average of per-class annual returns.
    pub fn expected_return(&self, returns: &BTreeMap<AssetClass, f64>) -> f64 {
        self.normalized()
            .iter()
            .map(|(class, w)| w * returns.get(&class).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Goal category tag, normalised to snake_case. Behaviour per category is
/// looked up in the configured category table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct GoalCategory(String);

impl GoalCategory {
    pub fn new(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for GoalCategory {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for GoalCategory {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<GoalCategory> for String {
    fn from(value: GoalCategory) -> Self {
        value.0
    }
}

impl fmt::Display for GoalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Months(u32),
    TargetDate(NaiveDate),
}

impl TimeHorizon {
    /// Whole months from `as_of`, or `None` when the horizon is already over.
    pub fn months_from(self, as_of: NaiveDate) -> Option<u32> {
        let months = match self {
            TimeHorizon::Months(months) => i64::from(months),
            TimeHorizon::TargetDate(date) => {
                let mut months = i64::from(date.year() - as_of.year()) * 12
                    + i64::from(date.month()) - i64::from(as_of.month());
                if date.day() < as_of.day() {
                    months -= 1;
                }
                months
            }
        };
        if months <= 0 {
            None
        } else {
            u32::try_from(months).ok()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub category: GoalCategory,
    pub target_amount: f64,
    pub current_amount: f64,
    pub time_horizon: TimeHorizon,
    #[serde(default)]
    pub monthly_contribution: f64,
    #[serde(default)]
    pub priority: Priority,
    pub asset_allocation: AssetAllocation,
    #[serde(default)]
    pub has_fixed_deadline: bool,
}

impl Goal {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeStage {
    pub has_dependents: bool,
    pub single_income: bool,
    pub near_retirement: bool,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub age: u32,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    #[serde(default)]
    pub life_stage: LifeStage,
    #[serde(default = "today")]
    pub as_of: NaiveDate,
}

impl Profile {
    pub fn disposable_income(&self) -> f64 {
        (self.monthly_income - self.monthly_expenses).max(0.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Manageable,
    Moderate,
    Significant,
    Severe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapResult {
    pub goal_id: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub gap_amount: f64,
    pub gap_percentage: f64,
    pub months_remaining: u32,
    pub timeframe_gap: u32,
    pub required_monthly_contribution: f64,
    pub capacity_gap: f64,
    pub severity: Severity,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    TargetAmount,
    Timeframe,
    Contribution,
    Allocation,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::TargetAmount => "target_amount",
            Axis::Timeframe => "timeframe",
            Axis::Contribution => "contribution",
            Axis::Allocation => "allocation",
        }
    }
}

/// The changed fields of a goal configuration. Unset fields keep the goal's
/// current value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdjustmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_contribution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_allocation: Option<AssetAllocation>,
}

impl AdjustmentPatch {
    pub fn axes(&self) -> Vec<Axis> {
        let mut axes = Vec::new();
        if self.target_amount.is_some() {
            axes.push(Axis::TargetAmount);
        }
        if self.horizon_months.is_some() {
            axes.push(Axis::Timeframe);
        }
        if self.monthly_contribution.is_some() {
            axes.push(Axis::Contribution);
        }
        if self.asset_allocation.is_some() {
            axes.push(Axis::Allocation);
        }
        axes
    }

    /// Fields set on `other` win.
    pub fn merge(&self, other: &AdjustmentPatch) -> AdjustmentPatch {
        AdjustmentPatch {
            target_amount: other.target_amount.or(self.target_amount),
            horizon_months: other.horizon_months.or(self.horizon_months),
            monthly_contribution: other.monthly_contribution.or(self.monthly_contribution),
            asset_allocation: other
                .asset_allocation
                .clone()
                .or_else(|| self.asset_allocation.clone()),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Single,
    Combined,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct AdjustmentImpact {
    pub probability_change: f64,
    pub monthly_budget_impact: f64,
    pub total_budget_impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentOption {
    pub kind: OptionKind,
    pub axes: Vec<Axis>,
    pub new_value: AdjustmentPatch,
    pub description: String,
    pub impact: AdjustmentImpact,
    pub confidence_score: f64,
    pub suitability_score: f64,
    pub degraded: bool,
}

impl AdjustmentOption {
    pub fn with_suitability(&self, suitability_score: f64) -> AdjustmentOption {
        AdjustmentOption {
            suitability_score,
            ..self.clone()
        }
    }

    pub fn is_combined(&self) -> bool {
        self.kind == OptionKind::Combined
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentRecommendation {
    pub goal_id: String,
    pub current_probability: f64,
    pub target_probability: f64,
    pub adjustment_options: Vec<AdjustmentOption>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AdjustmentRecommendation {
    pub fn single_options(&self) -> impl Iterator<Item = &AdjustmentOption> {
        self.adjustment_options.iter().filter(|o| !o.is_combined())
    }

    pub fn combined_options(&self) -> impl Iterator<Item = &AdjustmentOption> {
        self.adjustment_options.iter().filter(|o| o.is_combined())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub goal_id: String,
    pub category: GoalCategory,
    #[serde(default)]
    pub priority: Priority,
    pub horizon_months: u32,
    pub requested_monthly_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalAllocation {
    pub goal_id: String,
    pub requested_monthly_amount: f64,
    pub allocated_monthly_amount: f64,
    pub priority_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub feasible: bool,
    pub available_budget: f64,
    pub total_required: f64,
    pub total_allocated: f64,
    pub allocations: Vec<GoalAllocation>,
}

impl AllocationPlan {
    pub fn allocation_for(&self, goal_id: &str) -> Option<&GoalAllocation> {
        self.allocations.iter().find(|a| a.goal_id == goal_id)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineReason {
    HorizonProximity,
    CategoryAffinity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundStatus {
    pub total_target: f64,
    pub total_current: f64,
    pub total_monthly_contribution: f64,
    pub funded_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundStrategy {
    pub display_name: String,
    pub goal_ids: Vec<String>,
    pub reason: CombineReason,
    pub horizon_months: u32,
    pub earliest_deadline_months: u32,
    pub current_status: CompoundStatus,
    pub asset_allocation: AssetAllocation,
}
