use budget_bandit::constraints::clamp;
use budget_bandit::reward::calculate_reward;
use budget_bandit::{
    BudgetAction, Category, ContextualBudgetOptimizer, OptimizerConfig, Outcome, RiskLevel, RiskTolerance,
    UserContext,
};
use std::collections::{BTreeMap, HashMap};

fn sample_context() -> UserContext {
    let mut ctx = UserContext::new(7, 50_000.0, 100_000.0, RiskTolerance::Moderate);
    ctx.spending_patterns = [
        (Category::Food, 8_000.0),
        (Category::Transport, 5_000.0),
        (Category::Entertainment, 3_000.0),
    ]
    .into_iter()
    .collect();
    ctx.historical_performance = [
        (Category::Food, 0.8),
        (Category::Transport, 0.9),
        (Category::Entertainment, 0.6),
    ]
    .into_iter()
    .collect();
    ctx.current_month_spending.insert(Category::Food, 2_000.0);
    ctx.goals_achieved.push("emergency_fund".to_string());
    ctx.month_day = 12;
    ctx
}

fn sample_budgets() -> HashMap<Category, f64> {
    [
        (Category::Food, 8_000.0),
        (Category::Transport, 5_000.0),
        (Category::Entertainment, 3_000.0),
        (Category::Groceries, 6_000.0),
        (Category::Bills, 4_000.0),
        (Category::Savings, 5_000.0),
    ]
    .into_iter()
    .collect()
}

fn seeded(seed: u64) -> ContextualBudgetOptimizer {
    ContextualBudgetOptimizer::new(OptimizerConfig {
        policy_seed: Some(seed),
        ..OptimizerConfig::default()
    })
}

#[test]
fn fresh_optimizer_recommends_every_category() {
    let mut opt = seeded(3);
    let plan = opt.optimize_complete_budget(&sample_context(), &sample_budgets());

    assert_eq!(plan.len(), Category::COUNT);
    for (category, action) in &plan {
        assert_eq!(action.category, *category);
        assert!(action.recommended_amount >= 0.0);
        assert!((0.0..=1.0).contains(&action.confidence));
        assert!(!action.reasoning.is_empty());
    }
}

#[test]
fn savings_floor_holds_with_exploration_off() {
    let mut opt = seeded(11);
    opt.set_exploration_enabled(false);
    let action = opt.select_budget_action(&sample_context(), Category::Savings, 5_000.0);
    assert!(action.recommended_amount >= 5_000.0);
}

#[test]
fn entertainment_cap_only_bites_above_limit() {
    assert_eq!(clamp(Category::Entertainment, 3_600.0, 50_000.0, RiskTolerance::Moderate), 3_600.0);
    assert_eq!(clamp(Category::Entertainment, 8_000.0, 50_000.0, RiskTolerance::Moderate), 7_500.0);
}

#[test]
fn reward_below_minimum_is_lower() {
    let ctx = sample_context();
    let outcome = Outcome::new(0.8, 0.7, 0.6);
    for category in [Category::Groceries, Category::Bills, Category::Savings] {
        let under = BudgetAction::new(category, 100.0, 100.0, String::new(), 0.5);
        let at = BudgetAction::new(category, 10_000.0, 10_000.0, String::new(), 0.5);
        assert!(
            calculate_reward(&under, &ctx, Some(&outcome)) < calculate_reward(&at, &ctx, Some(&outcome)),
            "{category}"
        );
    }
}

#[test]
fn exploitation_is_deterministic_after_training() {
    let mut opt = seeded(5);
    let ctx = sample_context();
    let plan = opt.optimize_complete_budget(&ctx, &sample_budgets());
    let outcomes: HashMap<Category, Outcome> = plan.keys().map(|&c| (c, Outcome::new(0.7, 0.6, 0.5))).collect();
    for _ in 0..10 {
        opt.update_models_with_feedback(&ctx, &plan, &outcomes);
    }

    opt.set_exploration_enabled(false);
    for category in Category::ALL {
        assert!(opt.bank().is_ready(category), "{category}");
        let a = opt.select_budget_action(&ctx, category, 4_000.0);
        let b = opt.select_budget_action(&ctx, category, 4_000.0);
        assert_eq!(a, b);
    }
}

#[test]
fn feedback_never_raises_exploration() {
    let mut opt = seeded(9);
    let ctx = sample_context();
    let mut previous = opt.exploration_rate();
    for round in 0..50 {
        let plan = opt.optimize_complete_budget(&ctx, &sample_budgets());
        let outcomes: HashMap<Category, Outcome> = plan
            .keys()
            .filter(|c| (c.index() + round) % 2 == 0)
            .map(|&c| (c, Outcome::default()))
            .collect();
        let report = opt.update_models_with_feedback(&ctx, &plan, &outcomes);
        assert!(report.failures.is_empty());
        assert!(opt.exploration_rate() <= previous);
        assert!(opt.exploration_rate() >= 0.05);
        previous = opt.exploration_rate();
    }
}

#[test]
fn zero_income_is_handled() {
    let mut opt = seeded(2);
    let ctx = UserContext::new(1, 0.0, 0.0, RiskTolerance::Aggressive);
    let plan = opt.optimize_complete_budget(&ctx, &sample_budgets());
    assert_eq!(plan.len(), Category::COUNT);
    for action in plan.values() {
        assert!(!action.reasoning.ends_with("(Adjusted to fit total budget constraints)"));
    }

    let insights = opt.get_budget_insights(&ctx, &sample_budgets());
    assert_eq!(insights.budget_summary.income_utilization, 0.0);
    assert_eq!(insights.risk_assessment.essential_ratio, 0.0);
}

#[test]
fn insights_flag_heavy_discretionary_spend() {
    let opt = seeded(1);
    let ctx = sample_context();
    let budgets: HashMap<Category, f64> = [
        (Category::Entertainment, 10_000.0),
        (Category::Shopping, 10_000.0),
        (Category::Food, 6_000.0),
        (Category::Bills, 5_000.0),
    ]
    .into_iter()
    .collect();
    let insights = opt.get_budget_insights(&ctx, &budgets);
    assert_eq!(insights.risk_assessment.level, RiskLevel::High);
    assert!(!insights.optimization_opportunities.is_empty());
}

#[test]
fn unmatched_feedback_is_ignored() {
    let mut opt = seeded(4);
    let ctx = sample_context();
    let actions: BTreeMap<Category, BudgetAction> = [(
        Category::Food,
        BudgetAction::new(Category::Food, 7_600.0, 8_000.0, String::new(), 0.5),
    )]
    .into_iter()
    .collect();
    let outcomes: HashMap<Category, Outcome> = [(Category::Bills, Outcome::new(1.0, 1.0, 1.0))].into_iter().collect();
    let report = opt.update_models_with_feedback(&ctx, &actions, &outcomes);
    assert!(report.rewards.is_empty());
    assert!(opt.bank().performance().is_empty());
}
