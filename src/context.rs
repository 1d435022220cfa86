//! User financial context and the context feature extractor.

use crate::category::Category;
use crate::config::OptimizerConfig;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Length of the context feature vector: 5 scalar features, a 3-slot risk
/// one-hot, then three per-category blocks.
pub const CONTEXT_FEATURES: usize = 5 + 3 + 3 * Category::COUNT;

/// Context features plus `[action delta, current amount / budget scale]`.
pub const ACTION_FEATURES: usize = CONTEXT_FEATURES + 2;

const DEFAULT_PERFORMANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTolerance::Conservative => "conservative",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::Aggressive => "aggressive",
        }
    }

    fn one_hot(self) -> [f64; 3] {
        match self {
            RiskTolerance::Conservative => [1.0, 0.0, 0.0],
            RiskTolerance::Moderate => [0.0, 1.0, 0.0],
            RiskTolerance::Aggressive => [0.0, 0.0, 1.0],
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTolerance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" | "low" | "risk averse" | "risk-averse" => Ok(RiskTolerance::Conservative),
            "moderate" | "balanced" | "medium" => Ok(RiskTolerance::Moderate),
            "aggressive" | "high" | "risk seeking" | "risk-seeking" => Ok(RiskTolerance::Aggressive),
            other => Err(format!("unknown risk tolerance '{other}'")),
        }
    }
}

// Unknown tolerances read as moderate rather than failing the whole context.
impl<'de> Deserialize<'de> for RiskTolerance {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|e: String| {
            warn!("{e}, treating as moderate");
            RiskTolerance::Moderate
        }))
    }
}

/// Serde helper: accept any string keys and drop the ones that are not part
/// of the taxonomy. A `null` map reads as empty.
pub fn deserialize_category_map<'de, D, V>(deserializer: D) -> Result<HashMap<Category, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = Option::<HashMap<String, V>>::deserialize(deserializer)?.unwrap_or_default();
    let mut out = HashMap::with_capacity(raw.len());
    for (name, value) in raw {
        match name.parse::<Category>() {
            Ok(category) => {
                out.insert(category, value);
            }
            Err(e) => warn!("{e}, ignoring entry"),
        }
    }
    Ok(out)
}

/// Snapshot of a user's finances for one optimization call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: u64,
    pub income: f64,
    #[serde(default)]
    pub savings_goal: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    /// Historical average spend per category.
    #[serde(default, deserialize_with = "deserialize_category_map")]
    pub spending_patterns: HashMap<Category, f64>,
    /// Budget adherence per category, in [0, 1].
    #[serde(default, deserialize_with = "deserialize_category_map")]
    pub historical_performance: HashMap<Category, f64>,
    #[serde(default, deserialize_with = "deserialize_category_map")]
    pub current_month_spending: HashMap<Category, f64>,
    #[serde(default)]
    pub goals_achieved: Vec<String>,
    #[serde(default = "default_month_day")]
    pub month_day: u32,
    #[serde(default)]
    pub is_weekend: bool,
}

fn default_month_day() -> u32 {
    1
}

impl UserContext {
    pub fn new(user_id: u64, income: f64, savings_goal: f64, risk_tolerance: RiskTolerance) -> Self {
        UserContext {
            user_id,
            income,
            savings_goal,
            risk_tolerance,
            spending_patterns: HashMap::new(),
            historical_performance: HashMap::new(),
            current_month_spending: HashMap::new(),
            goals_achieved: Vec::new(),
            month_day: 1,
            is_weekend: false,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, Box<dyn Error>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set day-of-month and weekend flag from a calendar date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.month_day = date.day();
        self.is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        self
    }

    /// `amount / income`, or 0 when income is not positive.
    pub fn income_ratio(&self, amount: f64) -> f64 {
        if self.income > 0.0 {
            amount / self.income
        } else {
            0.0
        }
    }

    pub fn historical_average(&self, category: Category) -> f64 {
        self.spending_patterns.get(&category).copied().unwrap_or(0.0)
    }

    pub fn performance(&self, category: Category) -> f64 {
        self.historical_performance
            .get(&category)
            .copied()
            .unwrap_or(DEFAULT_PERFORMANCE)
    }
}

/// Fixed-order numeric features for the reward models.
///
/// Missing category entries read as 0 (0.5 for performance) and every
/// income ratio is 0 when income is not positive, so this never fails.
pub fn extract_features(context: &UserContext, config: &OptimizerConfig) -> Vec<f64> {
    let mut features = Vec::with_capacity(CONTEXT_FEATURES);

    features.push(context.income / config.income_scale);
    features.push(context.income_ratio(context.savings_goal));
    features.push(context.goals_achieved.len() as f64 / config.goals_cap);
    features.push(context.month_day as f64 / 31.0);
    features.push(if context.is_weekend { 1.0 } else { 0.0 });

    features.extend_from_slice(&context.risk_tolerance.one_hot());

    for category in Category::ALL {
        features.push(context.income_ratio(context.historical_average(category)));
    }
    for category in Category::ALL {
        let spent = context.current_month_spending.get(&category).copied().unwrap_or(0.0);
        features.push(context.income_ratio(spent));
    }
    for category in Category::ALL {
        features.push(context.performance(category));
    }

    features
}

/// Append the action-specific features to a context feature vector.
pub fn with_action(context_features: &[f64], delta: f64, current_amount: f64, budget_scale: f64) -> Vec<f64> {
    let mut features = Vec::with_capacity(context_features.len() + 2);
    features.extend_from_slice(context_features);
    features.push(delta);
    features.push(current_amount / budget_scale);
    features
}
