//! Allocation constraints.
//!
//! Static per-category floors and caps (as fractions of income), risk
//! tolerance multipliers, and the portfolio-level pass that shrinks
//! discretionary categories when the whole plan would spend too much income.

use crate::action::BudgetAction;
use crate::category::Category;
use crate::config::OptimizerConfig;
use crate::context::RiskTolerance;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const RESCALE_NOTE: &str = " (Adjusted to fit total budget constraints)";

/// Minimum share of income a category must receive.
pub fn min_fraction(category: Category) -> Option<f64> {
    match category {
        Category::Groceries => Some(0.05),
        Category::Bills => Some(0.10),
        Category::Transport => Some(0.05),
        Category::Healthcare => Some(0.02),
        Category::Savings => Some(0.10),
        Category::Food
        | Category::Shopping
        | Category::Entertainment
        | Category::Investment
        | Category::Education => None,
    }
}

/// Maximum share of income a category may receive.
pub fn max_fraction(category: Category) -> Option<f64> {
    match category {
        Category::Entertainment => Some(0.15),
        Category::Shopping => Some(0.20),
        Category::Food => Some(0.25),
        Category::Groceries
        | Category::Transport
        | Category::Bills
        | Category::Healthcare
        | Category::Investment
        | Category::Education
        | Category::Savings => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMultipliers {
    pub investment: f64,
    pub discretionary: f64,
}

pub fn risk_multipliers(tolerance: RiskTolerance) -> RiskMultipliers {
    match tolerance {
        RiskTolerance::Conservative => RiskMultipliers {
            investment: 0.8,
            discretionary: 0.9,
        },
        RiskTolerance::Moderate => RiskMultipliers {
            investment: 1.0,
            discretionary: 1.0,
        },
        RiskTolerance::Aggressive => RiskMultipliers {
            investment: 1.3,
            discretionary: 1.1,
        },
    }
}

/// Apply floor, cap and risk multiplier to a proposed amount.
///
/// With a non-positive income the amount is returned unchanged since no
/// ratio can be computed.
pub fn clamp(category: Category, proposed: f64, income: f64, tolerance: RiskTolerance) -> f64 {
    if income <= 0.0 {
        return proposed;
    }

    let mut amount = proposed;
    if let Some(min) = min_fraction(category) {
        amount = amount.max(income * min);
    }
    if let Some(max) = max_fraction(category) {
        amount = amount.min(income * max);
    }

    let multipliers = risk_multipliers(tolerance);
    if category.is_investment() {
        amount *= multipliers.investment;
    } else if category.is_discretionary() {
        amount *= multipliers.discretionary;
    }

    let amount = amount.max(0.0);
    if (amount - proposed).abs() > f64::EPSILON {
        debug!(category = %category, proposed, clamped = amount, "constraint adjusted amount");
    }
    amount
}

/// What the rescaling pass did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescaleReport {
    pub total_before: f64,
    pub total_after: f64,
    pub discretionary_before: f64,
    pub reduction_factor: f64,
}

/// Shrink discretionary recommendations when the plan exceeds
/// `income * (1 - safety_margin)`.
///
/// Only discretionary categories are touched, and never by more than
/// `1 - rescale_floor` in one pass. Returns `None` when nothing was scaled,
/// which includes every plan for a non-positive income.
pub fn rescale_to_income(
    actions: &mut BTreeMap<Category, BudgetAction>,
    income: f64,
    config: &OptimizerConfig,
) -> Option<RescaleReport> {
    if income <= 0.0 {
        return None;
    }
    let ceiling = income * (1.0 - config.safety_margin);
    let total_before: f64 = actions.values().map(|a| a.recommended_amount).sum();
    if total_before <= ceiling {
        return None;
    }

    let discretionary_before: f64 = actions
        .values()
        .filter(|a| a.category.is_discretionary())
        .map(|a| a.recommended_amount)
        .sum();
    if discretionary_before <= 0.0 {
        warn!(total = total_before, ceiling, "plan exceeds income ceiling but has no discretionary room");
        return None;
    }

    let excess = total_before - ceiling;
    let reduction_factor = (1.0 - excess / discretionary_before).max(config.rescale_floor);

    for action in actions.values_mut().filter(|a| a.category.is_discretionary()) {
        action.set_recommended(action.recommended_amount * reduction_factor);
        action.reasoning.push_str(RESCALE_NOTE);
        action.confidence = (action.confidence * config.rescale_confidence_factor).clamp(0.0, 1.0);
    }

    let total_after: f64 = actions.values().map(|a| a.recommended_amount).sum();
    info!(
        total_before,
        total_after,
        factor = reduction_factor,
        "rescaled discretionary categories to fit income"
    );
    if total_after > ceiling {
        warn!(
            total_after,
            ceiling, "rescale floor reached, plan still exceeds the income ceiling"
        );
    }

    Some(RescaleReport {
        total_before,
        total_after,
        discretionary_before,
        reduction_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(category: Category, amount: f64) -> BudgetAction {
        BudgetAction::new(category, amount, amount, "ok".to_string(), 0.5)
    }

    #[test]
    fn floor_applies_before_multiplier() {
        let amount = clamp(Category::Savings, 1_000.0, 50_000.0, RiskTolerance::Moderate);
        assert_eq!(amount, 5_000.0);
        let conservative = clamp(Category::Savings, 1_000.0, 50_000.0, RiskTolerance::Conservative);
        assert!((conservative - 4_000.0).abs() < 1e-9);
    }

    #[test]
    fn cap_limits_discretionary() {
        assert_eq!(clamp(Category::Entertainment, 3_600.0, 50_000.0, RiskTolerance::Moderate), 3_600.0);
        assert_eq!(clamp(Category::Entertainment, 8_000.0, 50_000.0, RiskTolerance::Moderate), 7_500.0);
        let aggressive = clamp(Category::Entertainment, 8_000.0, 50_000.0, RiskTolerance::Aggressive);
        assert!((aggressive - 8_250.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_income_passes_through() {
        assert_eq!(clamp(Category::Bills, 123.0, 0.0, RiskTolerance::Aggressive), 123.0);
        assert_eq!(clamp(Category::Bills, -5.0, -1.0, RiskTolerance::Moderate), -5.0);
    }

    #[test]
    fn result_is_never_negative() {
        assert_eq!(clamp(Category::Education, -50.0, 10_000.0, RiskTolerance::Moderate), 0.0);
    }

    #[test]
    fn rescale_only_touches_discretionary() {
        let mut actions = BTreeMap::new();
        actions.insert(Category::Bills, action(Category::Bills, 6_000.0));
        actions.insert(Category::Savings, action(Category::Savings, 2_000.0));
        actions.insert(Category::Food, action(Category::Food, 2_000.0));
        actions.insert(Category::Shopping, action(Category::Shopping, 2_000.0));

        // ceiling 9500, total 12000, excess 2500 over 4000 discretionary -> floor 0.7
        let report = rescale_to_income(&mut actions, 10_000.0, &OptimizerConfig::default()).unwrap();
        assert!((report.reduction_factor - 0.7).abs() < 1e-12);
        assert_eq!(actions[&Category::Bills].recommended_amount, 6_000.0);
        assert_eq!(actions[&Category::Savings].recommended_amount, 2_000.0);
        assert!((actions[&Category::Food].recommended_amount - 1_400.0).abs() < 1e-9);
        assert!(actions[&Category::Food].reasoning.ends_with(RESCALE_NOTE));
        assert!((actions[&Category::Food].change_percentage + 0.3).abs() < 1e-9);
        assert!((actions[&Category::Food].confidence - 0.45).abs() < 1e-12);
    }

    #[test]
    fn rescale_partial_factor_hits_ceiling() {
        let mut actions = BTreeMap::new();
        actions.insert(Category::Bills, action(Category::Bills, 8_000.0));
        actions.insert(Category::Entertainment, action(Category::Entertainment, 2_000.0));

        // total 10000, ceiling 9500, excess 500 -> factor 0.75
        let report = rescale_to_income(&mut actions, 10_000.0, &OptimizerConfig::default()).unwrap();
        assert!((report.reduction_factor - 0.75).abs() < 1e-12);
        assert!((report.total_after - 9_500.0).abs() < 1e-9);
    }

    #[test]
    fn no_rescale_under_ceiling_or_without_discretionary() {
        let mut actions = BTreeMap::new();
        actions.insert(Category::Bills, action(Category::Bills, 9_000.0));
        assert!(rescale_to_income(&mut actions, 10_000.0, &OptimizerConfig::default()).is_none());
        actions.insert(Category::Savings, action(Category::Savings, 5_000.0));
        assert!(rescale_to_income(&mut actions, 10_000.0, &OptimizerConfig::default()).is_none());
        assert_eq!(actions[&Category::Bills].recommended_amount, 9_000.0);
    }
}
