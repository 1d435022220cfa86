use budget_bandit::context::deserialize_category_map;
use budget_bandit::{
    Category, ContextualBudgetOptimizer, OptimizerConfig, Outcome, RiskTolerance, UserContext,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "budget_optimizer.json";

/// One optimization run: who, what they budget today, and optionally what
/// happened last time.
#[derive(Debug, Deserialize)]
struct Scenario {
    context: UserContext,
    #[serde(default, deserialize_with = "deserialize_category_map")]
    current_budgets: HashMap<Category, f64>,
    #[serde(default, deserialize_with = "deserialize_category_map")]
    outcomes: HashMap<Category, Outcome>,
}

fn sample_scenario() -> Scenario {
    let mut context = UserContext::new(1, 50_000.0, 100_000.0, RiskTolerance::Moderate);
    context.spending_patterns = [
        (Category::Food, 8_000.0),
        (Category::Transport, 5_000.0),
        (Category::Entertainment, 3_000.0),
    ]
    .into_iter()
    .collect();
    context.historical_performance = [
        (Category::Food, 0.8),
        (Category::Transport, 0.9),
        (Category::Entertainment, 0.6),
    ]
    .into_iter()
    .collect();
    context.current_month_spending = [
        (Category::Food, 2_000.0),
        (Category::Transport, 1_500.0),
        (Category::Entertainment, 1_000.0),
    ]
    .into_iter()
    .collect();
    context.goals_achieved = vec!["emergency_fund".to_string()];
    let context = context.with_date(chrono::Local::now().date_naive());

    let current_budgets = [
        (Category::Food, 8_000.0),
        (Category::Transport, 5_000.0),
        (Category::Entertainment, 3_000.0),
        (Category::Groceries, 6_000.0),
        (Category::Bills, 4_000.0),
        (Category::Savings, 5_000.0),
    ]
    .into_iter()
    .collect();

    Scenario {
        context,
        current_budgets,
        outcomes: HashMap::new(),
    }
}

struct Args {
    scenario: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    config: PathBuf,
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args {
        scenario: None,
        state_dir: None,
        config: PathBuf::from(DEFAULT_CONFIG),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--state" => args.state_dir = Some(it.next().ok_or("--state needs a directory")?.into()),
            "--config" => args.config = it.next().ok_or("--config needs a file")?.into(),
            other if other.starts_with("--") => Err(format!("unknown flag '{other}'"))?,
            path => args.scenario = Some(path.into()),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = parse_args()?;
    let config = OptimizerConfig::load(&args.config)?;
    let shared = ContextualBudgetOptimizer::new(config).into_shared();

    if let Some(dir) = &args.state_dir {
        if let Err(e) = shared.lock().load_state(dir) {
            warn!(error = %e, "could not load optimizer state, starting fresh");
        }
    }

    let scenario = match &args.scenario {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read scenario '{}': {}", path.display(), e))?;
            serde_json::from_str(&contents)?
        }
        None => {
            info!("no scenario given, using the built-in sample");
            sample_scenario()
        }
    };

    let recommendations = shared
        .lock()
        .optimize_complete_budget(&scenario.context, &scenario.current_budgets);

    println!("Budget Recommendations:");
    for (category, action) in &recommendations {
        println!(
            "{}: ₹{:.0} → ₹{:.0} ({:+.1}%)",
            category,
            action.current_amount,
            action.recommended_amount,
            action.change_percentage * 100.0
        );
        println!("  Reasoning: {}", action.reasoning);
        println!("  Confidence: {:.2}", action.confidence);
        println!();
    }

    let recommended: HashMap<Category, f64> = recommendations
        .iter()
        .map(|(&c, a)| (c, a.recommended_amount))
        .collect();
    let insights = shared.lock().get_budget_insights(&scenario.context, &recommended);
    println!("Insights:\n{}", serde_json::to_string_pretty(&insights)?);

    if !scenario.outcomes.is_empty() {
        let taken: BTreeMap<Category, _> = recommendations
            .into_iter()
            .filter(|(c, _)| scenario.outcomes.contains_key(c))
            .collect();
        let report = shared
            .lock()
            .update_models_with_feedback(&scenario.context, &taken, &scenario.outcomes);
        info!(
            updated = report.rewards.len(),
            refits = report.refits.len(),
            failures = report.failures.len(),
            exploration_rate = report.exploration_rate,
            "applied feedback"
        );
    }

    if let Some(dir) = args.state_dir {
        let handle = shared.clone();
        tokio::task::spawn_blocking(move || handle.lock().save_state(&dir)).await??;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_outcomes_drop_unknown_categories() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "context": { "user_id": 1, "income": 40000 },
                "current_budgets": { "Food": 6000 },
                "outcomes": {
                    "Food": { "budget_adherence": 0.9 },
                    "crypto": { "user_satisfaction": 0.1 }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.current_budgets[&Category::Food], 6_000.0);
        assert_eq!(scenario.outcomes.len(), 1);
        assert_eq!(scenario.outcomes[&Category::Food].budget_adherence, Some(0.9));
        assert_eq!(scenario.outcomes[&Category::Food].user_satisfaction, None);
    }

    #[test]
    fn scenario_without_outcomes_parses() {
        let scenario: Scenario =
            serde_json::from_str(r#"{ "context": { "user_id": 2, "income": 1000 } }"#).unwrap();
        assert!(scenario.outcomes.is_empty());
        assert!(scenario.current_budgets.is_empty());
    }
}
