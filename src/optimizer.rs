//! The contextual bandit budget optimizer.

use crate::action::{ActionSpace, BudgetAction};
use crate::category::Category;
use crate::config::OptimizerConfig;
use crate::constraints::{clamp, rescale_to_income};
use crate::context::{extract_features, with_action, UserContext};
use crate::models::{ModelUpdate, RewardModelBank};
use crate::policy::{self, RandomSource};
use crate::reasoning::{budget_insights, explain, BudgetInsights};
use crate::reward::{calculate_reward, Outcome};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Optimizer behind the coarse per-instance lock: persistence and feedback
/// updates cannot interleave.
pub type SharedOptimizer = Arc<Mutex<ContextualBudgetOptimizer>>;

/// Mutable bandit state owned by one optimizer instance.
pub struct BanditState {
    pub exploration_rate: f64,
    pub bank: RewardModelBank,
}

/// Summary of one feedback batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackReport {
    pub rewards: BTreeMap<Category, f64>,
    pub refits: Vec<Category>,
    pub failures: Vec<Category>,
    pub exploration_rate: f64,
}

pub struct ContextualBudgetOptimizer {
    config: OptimizerConfig,
    space: ActionSpace,
    state: BanditState,
    explore: bool,
    rng: Box<dyn RandomSource>,
}

impl ContextualBudgetOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        let rng: Box<dyn RandomSource> = match config.policy_seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_entropy()),
        };
        Self::with_random_source(config, rng)
    }

    pub fn with_random_source(config: OptimizerConfig, rng: Box<dyn RandomSource>) -> Self {
        let exploration_rate = config
            .initial_exploration_rate
            .max(config.exploration_floor)
            .min(1.0);
        let bank = RewardModelBank::new(&config);
        ContextualBudgetOptimizer {
            config,
            space: ActionSpace::default(),
            state: BanditState { exploration_rate, bank },
            explore: true,
            rng,
        }
    }

    pub fn into_shared(self) -> SharedOptimizer {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    pub fn categories(&self) -> &'static [Category] {
        &Category::ALL
    }

    pub fn exploration_rate(&self) -> f64 {
        self.state.exploration_rate
    }

    pub fn exploration_enabled(&self) -> bool {
        self.explore
    }

    /// Turn the epsilon draw on or off. Off means pure exploitation; the
    /// stored exploration rate is left alone.
    pub fn set_exploration_enabled(&mut self, enabled: bool) {
        self.explore = enabled;
    }

    pub fn set_random_source(&mut self, rng: Box<dyn RandomSource>) {
        self.rng = rng;
    }

    pub fn bank(&self) -> &RewardModelBank {
        &self.state.bank
    }

    pub(crate) fn state_mut(&mut self) -> &mut BanditState {
        &mut self.state
    }

    pub fn extract_features(&self, context: &UserContext) -> Vec<f64> {
        extract_features(context, &self.config)
    }

    /// Pick, clamp and explain one category's adjustment.
    pub fn select_budget_action(&mut self, context: &UserContext, category: Category, current_budget: f64) -> BudgetAction {
        let features = self.extract_features(context);
        self.select_with_features(context, &features, category, current_budget)
    }

    fn select_with_features(
        &mut self,
        context: &UserContext,
        features: &[f64],
        category: Category,
        current_budget: f64,
    ) -> BudgetAction {
        let choice = policy::choose(
            self.rng.as_mut(),
            self.state.exploration_rate,
            self.explore,
            &self.state.bank,
            category,
            features,
            current_budget,
            &self.space,
            &self.config,
        );

        let delta = self.space.delta(choice.index);
        let proposed = current_budget * (1.0 + delta);
        let amount = clamp(category, proposed, context.income, context.risk_tolerance);
        let reasoning = explain(category, delta, context);

        BudgetAction::new(category, amount, current_budget, reasoning, choice.confidence)
    }

    /// Recommend every category, then shrink discretionary ones if the plan
    /// spends more than the safety-margined income.
    pub fn optimize_complete_budget(
        &mut self,
        context: &UserContext,
        current_budgets: &HashMap<Category, f64>,
    ) -> BTreeMap<Category, BudgetAction> {
        let features = self.extract_features(context);
        let mut recommendations = BTreeMap::new();

        for category in Category::ALL {
            let current = current_budgets.get(&category).copied().unwrap_or(0.0);
            let action = self.select_with_features(context, &features, category, current);
            recommendations.insert(category, action);
        }

        rescale_to_income(&mut recommendations, context.income, &self.config);

        debug!(
            user_id = context.user_id,
            total = recommendations.values().map(|a| a.recommended_amount).sum::<f64>(),
            "optimized complete budget"
        );
        recommendations
    }

    pub fn calculate_reward(&self, action: &BudgetAction, context: &UserContext, outcome: Option<&Outcome>) -> f64 {
        calculate_reward(action, context, outcome)
    }

    /// Learn from observed outcomes, then decay exploration.
    ///
    /// Only categories present in both maps are used. Each taken action is
    /// credited to the grid delta nearest its actual change.
    pub fn update_models_with_feedback(
        &mut self,
        context: &UserContext,
        actions_taken: &BTreeMap<Category, BudgetAction>,
        outcomes: &HashMap<Category, Outcome>,
    ) -> FeedbackReport {
        let features = self.extract_features(context);
        let mut report = FeedbackReport::default();

        for (&category, action) in actions_taken {
            let Some(outcome) = outcomes.get(&category) else {
                continue;
            };
            let reward = calculate_reward(action, context, Some(outcome));
            let index = self.space.nearest_index(action.change_percentage);
            let observation = with_action(
                &features,
                self.space.delta(index),
                action.current_amount,
                self.config.budget_scale,
            );

            match self.state.bank.update(category, &observation, reward) {
                Ok(update) => {
                    debug!(category = %category, reward, index, ?update, "reward model updated");
                    if let ModelUpdate::Refit { samples } = update {
                        info!(category = %category, samples, "reward model refit from buffered feedback");
                        report.refits.push(category);
                    }
                    report.rewards.insert(category, reward);
                }
                Err(e) => {
                    error!(category = %category, error = %e, "error updating reward model");
                    report.failures.push(category);
                }
            }
        }

        let decayed = self.state.exploration_rate * self.config.exploration_decay;
        self.state.exploration_rate = decayed.max(self.config.exploration_floor).min(self.state.exploration_rate);
        report.exploration_rate = self.state.exploration_rate;
        report
    }

    pub fn get_budget_insights(&self, context: &UserContext, current_budgets: &HashMap<Category, f64>) -> BudgetInsights {
        budget_insights(context, current_budgets)
    }
}
