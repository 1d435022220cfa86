//! Bounded reward signal for a budget action.

use crate::action::BudgetAction;
use crate::category::Category;
use crate::constraints::{max_fraction, min_fraction, risk_multipliers};
use crate::context::UserContext;
use serde::{Deserialize, Serialize};

const UNDER_MINIMUM_PENALTY: f64 = 0.3;
const OVER_MAXIMUM_PENALTY: f64 = 0.2;
const HISTORY_WEIGHT: f64 = 0.2;
const RISK_ALIGNMENT_BONUS: f64 = 0.2;
const GOAL_WEIGHT: f64 = 0.3;
const ADHERENCE_WEIGHT: f64 = 0.3;
const SATISFACTION_WEIGHT: f64 = 0.2;
const PROGRESS_WEIGHT: f64 = 0.2;
const CONFIDENCE_WEIGHT: f64 = 0.1;
const MISSING_OUTCOME_SCORE: f64 = 0.5;

/// What actually happened after a recommendation was applied. Absent
/// fields count as 0.5.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default)]
    pub budget_adherence: Option<f64>,
    #[serde(default)]
    pub user_satisfaction: Option<f64>,
    #[serde(default)]
    pub goal_progress: Option<f64>,
}

impl Outcome {
    pub fn new(budget_adherence: f64, user_satisfaction: f64, goal_progress: f64) -> Self {
        Outcome {
            budget_adherence: Some(budget_adherence),
            user_satisfaction: Some(user_satisfaction),
            goal_progress: Some(goal_progress),
        }
    }

    fn score(&self) -> f64 {
        let adherence = self.budget_adherence.unwrap_or(MISSING_OUTCOME_SCORE);
        let satisfaction = self.user_satisfaction.unwrap_or(MISSING_OUTCOME_SCORE);
        let progress = self.goal_progress.unwrap_or(MISSING_OUTCOME_SCORE);
        ADHERENCE_WEIGHT * adherence + SATISFACTION_WEIGHT * satisfaction + PROGRESS_WEIGHT * progress
    }
}

/// Weighted sum of feasibility, history, risk, goal, outcome and confidence
/// signals, clamped to [0, 1].
pub fn calculate_reward(action: &BudgetAction, context: &UserContext, outcome: Option<&Outcome>) -> f64 {
    let category = action.category;
    let amount = action.recommended_amount;
    let mut reward = 0.0;

    let share = context.income_ratio(amount);
    if min_fraction(category).is_some_and(|min| share < min) {
        reward -= UNDER_MINIMUM_PENALTY;
    }
    if max_fraction(category).is_some_and(|max| share > max) {
        reward -= OVER_MAXIMUM_PENALTY;
    }

    let historical = context.historical_average(category);
    if historical > 0.0 {
        let deviation = (amount - historical).abs() / historical;
        reward += HISTORY_WEIGHT * (1.0 - deviation.min(1.0));
    }

    if category.is_investment() {
        let bias = risk_multipliers(context.risk_tolerance).investment;
        let change = action.change_percentage;
        if (bias > 1.0 && change > 0.0) || (bias < 1.0 && change < 0.0) {
            reward += RISK_ALIGNMENT_BONUS;
        }
    }

    if category == Category::Savings && context.savings_goal > 0.0 {
        let annual = amount * 12.0;
        reward += GOAL_WEIGHT * (annual / context.savings_goal).min(1.0);
    }

    if let Some(outcome) = outcome {
        reward += outcome.score();
    }

    reward += CONFIDENCE_WEIGHT * action.confidence;

    reward.clamp(0.0, 1.0)
}
