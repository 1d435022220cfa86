//! Human-readable explanations and portfolio-level insights.
//!
//! Everything here is template based and deterministic.

use crate::category::{Category, CategoryGroup};
use crate::constraints::max_fraction;
use crate::context::{RiskTolerance, UserContext};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

const BALANCED_THRESHOLD: f64 = 0.01;
const LOW_ADHERENCE: f64 = 0.7;
const HIGH_ADHERENCE: f64 = 0.9;
const MIN_SAVINGS_SHARE: f64 = 0.1;
const DEFAULT_OPPORTUNITY_CAP: f64 = 0.2;

/// Format a whole-currency amount with comma thousands separators.
fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as u64);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Explain a chosen adjustment for one category.
pub fn explain(category: Category, change: f64, context: &UserContext) -> String {
    if change.abs() < BALANCED_THRESHOLD {
        return format!(
            "Your current {category} budget is well-balanced based on your spending patterns and goals."
        );
    }

    let increase = change > 0.0;
    let direction = if increase { "increase" } else { "decrease" };
    let percentage = change.abs() * 100.0;
    let mut reasons: Vec<String> = Vec::new();

    if category == Category::Savings {
        if increase {
            reasons.push(format!(
                "to help you reach your savings goal of ₹{}",
                group_thousands(context.savings_goal)
            ));
        } else {
            reasons.push("to free up funds for other essential expenses".to_string());
        }
    } else if category == Category::Investment {
        match (increase, context.risk_tolerance) {
            (true, RiskTolerance::Aggressive) => {
                reasons.push("based on your aggressive investment risk tolerance".to_string())
            }
            (false, RiskTolerance::Conservative) => {
                reasons.push("aligned with your conservative investment approach".to_string())
            }
            _ => {}
        }
    } else if category.is_essential() {
        if increase {
            reasons.push("to ensure adequate coverage of essential expenses".to_string());
        } else {
            reasons.push("as your current allocation seems sufficient".to_string());
        }
    } else if category.is_discretionary() {
        if increase {
            reasons.push("to improve your lifestyle within reasonable limits".to_string());
        } else {
            reasons.push("to optimize your spending on discretionary items".to_string());
        }
    }

    let adherence = context.performance(category);
    if adherence < LOW_ADHERENCE && !increase {
        reasons.push("since you've been exceeding this budget consistently".to_string());
    } else if adherence > HIGH_ADHERENCE && increase {
        reasons.push("as you've been staying well within this budget".to_string());
    }

    let base = format!("I recommend you {direction} your {category} budget by {percentage:.1}%");
    if reasons.is_empty() {
        format!("{base} based on your spending patterns and financial goals.")
    } else {
        format!("{base} {}.", reasons.join(" and "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn recommendations(self) -> Vec<String> {
        let lines: &[&str] = match self {
            RiskLevel::Low => &[
                "Your budget allocation looks balanced",
                "Consider increasing investment allocation if possible",
            ],
            RiskLevel::Medium => &[
                "Review discretionary spending for optimization opportunities",
                "Ensure emergency fund is adequate",
            ],
            RiskLevel::High => &[
                "Prioritize essential categories",
                "Reduce discretionary spending",
                "Build emergency fund",
            ],
        };
        lines.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub total_allocated: f64,
    pub income_utilization: f64,
    pub remaining_income: f64,
    /// Percent of the total allocated, per category.
    pub allocation_breakdown: BTreeMap<Category, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub essential_ratio: f64,
    pub discretionary_ratio: f64,
    pub investment_ratio: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAlignment {
    pub savings_goal_progress: f64,
    pub annual_savings_projection: f64,
    /// `None` when nothing is being put aside each month.
    pub months_to_goal: Option<f64>,
    pub alignment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetInsights {
    pub budget_summary: BudgetSummary,
    pub risk_assessment: RiskAssessment,
    pub optimization_opportunities: Vec<String>,
    pub goal_alignment: GoalAlignment,
}

fn amount(budgets: &HashMap<Category, f64>, category: Category) -> f64 {
    budgets.get(&category).copied().unwrap_or(0.0)
}

fn group_total(budgets: &HashMap<Category, f64>, group: CategoryGroup) -> f64 {
    Category::members(group).map(|c| amount(budgets, c)).sum()
}

pub fn classify_risk(essential_ratio: f64, discretionary_ratio: f64) -> RiskLevel {
    if essential_ratio < 0.3 || discretionary_ratio > 0.4 {
        RiskLevel::High
    } else if essential_ratio > 0.7 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn assess_risk(context: &UserContext, budgets: &HashMap<Category, f64>) -> RiskAssessment {
    let essential_ratio = context.income_ratio(group_total(budgets, CategoryGroup::Essential));
    let discretionary_ratio = context.income_ratio(group_total(budgets, CategoryGroup::Discretionary));
    let investment_ratio = context.income_ratio(group_total(budgets, CategoryGroup::Investment));
    let level = classify_risk(essential_ratio, discretionary_ratio);
    RiskAssessment {
        level,
        essential_ratio,
        discretionary_ratio,
        investment_ratio,
        recommendations: level.recommendations(),
    }
}

fn find_opportunities(context: &UserContext, budgets: &HashMap<Category, f64>) -> Vec<String> {
    let mut opportunities = Vec::new();

    if context.income_ratio(amount(budgets, Category::Savings)) < MIN_SAVINGS_SHARE {
        opportunities.push("Consider increasing savings allocation to at least 10% of income".to_string());
    }

    for category in [Category::Entertainment, Category::Shopping] {
        let share = context.income_ratio(amount(budgets, category));
        let cap = max_fraction(category).unwrap_or(DEFAULT_OPPORTUNITY_CAP);
        if share > cap {
            opportunities.push(format!(
                "Consider reducing {category} budget from {:.1}% to {:.1}% of income",
                share * 100.0,
                cap * 100.0
            ));
        }
    }

    opportunities
}

fn assess_goals(context: &UserContext, budgets: &HashMap<Category, f64>) -> GoalAlignment {
    let monthly = amount(budgets, Category::Savings) + amount(budgets, Category::Investment);
    let annual = monthly * 12.0;
    let progress = if context.savings_goal > 0.0 {
        annual / context.savings_goal
    } else {
        1.0
    };
    GoalAlignment {
        savings_goal_progress: progress.min(1.0),
        annual_savings_projection: annual,
        months_to_goal: (monthly > 0.0).then(|| context.savings_goal / monthly),
        alignment_score: progress.min(1.0),
    }
}

/// Portfolio-level view of a set of budgets.
pub fn budget_insights(context: &UserContext, budgets: &HashMap<Category, f64>) -> BudgetInsights {
    let total: f64 = budgets.values().sum();
    let allocation_breakdown = budgets
        .iter()
        .map(|(&c, &a)| (c, if total > 0.0 { a / total * 100.0 } else { 0.0 }))
        .collect();

    BudgetInsights {
        budget_summary: BudgetSummary {
            total_allocated: total,
            income_utilization: context.income_ratio(total),
            remaining_income: (context.income - total).max(0.0),
            allocation_breakdown,
        },
        risk_assessment: assess_risk(context, budgets),
        optimization_opportunities: find_opportunities(context, budgets),
        goal_alignment: assess_goals(context, budgets),
    }
}
