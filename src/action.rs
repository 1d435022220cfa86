use crate::category::Category;
use serde::{Deserialize, Serialize};

/// One recommendation for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAction {
    pub category: Category,
    pub recommended_amount: f64,
    pub current_amount: f64,
    /// Signed fraction relative to `current_amount`, 0 when current is 0.
    pub change_percentage: f64,
    pub reasoning: String,
    pub confidence: f64,
}

impl BudgetAction {
    pub fn new(category: Category, recommended_amount: f64, current_amount: f64, reasoning: String, confidence: f64) -> Self {
        BudgetAction {
            category,
            recommended_amount,
            current_amount,
            change_percentage: change_fraction(current_amount, recommended_amount),
            reasoning,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Replace the recommended amount, keeping `change_percentage` in sync.
    pub fn set_recommended(&mut self, amount: f64) {
        self.recommended_amount = amount;
        self.change_percentage = change_fraction(self.current_amount, amount);
    }
}

pub fn change_fraction(current: f64, recommended: f64) -> f64 {
    if current > 0.0 {
        (recommended - current) / current
    } else {
        0.0
    }
}

/// Ordered grid of percentage adjustments the bandit chooses from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpace {
    deltas: Vec<f64>,
}

impl Default for ActionSpace {
    fn default() -> Self {
        ActionSpace {
            deltas: vec![-0.2, -0.1, -0.05, 0.0, 0.05, 0.1, 0.2],
        }
    }
}

impl ActionSpace {
    /// Index of the "no change" action used on every fallback path.
    pub const NO_CHANGE: usize = 3;

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    pub fn delta(&self, index: usize) -> f64 {
        self.deltas[index]
    }

    /// Grid index whose delta is closest to `change`.
    ///
    /// Equidistant buckets resolve to the smaller magnitude delta, then to the
    /// lower index.
    pub fn nearest_index(&self, change: f64) -> usize {
        self.deltas
            .iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| {
                let da = (*a - change).abs();
                let db = (*b - change).abs();
                da.total_cmp(&db)
                    .then(a.abs().total_cmp(&b.abs()))
                    .then(ia.cmp(ib))
            })
            .map(|(i, _)| i)
            .unwrap_or(Self::NO_CHANGE)
    }
}
