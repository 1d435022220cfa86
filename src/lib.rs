//! Contextual-bandit budget optimizer.
//!
//! Given a snapshot of a user's finances and their current per-category
//! budgets, recommends a percentage adjustment for every spending category,
//! keeps the plan inside income-based constraints, explains each change, and
//! learns from observed outcomes.
//!
//! ```no_run
//! use budget_bandit::{Category, ContextualBudgetOptimizer, OptimizerConfig, RiskTolerance, UserContext};
//! use std::collections::HashMap;
//!
//! let mut optimizer = ContextualBudgetOptimizer::new(OptimizerConfig::default());
//! let context = UserContext::new(1, 50_000.0, 100_000.0, RiskTolerance::Moderate);
//! let budgets: HashMap<Category, f64> = [(Category::Savings, 5_000.0)].into_iter().collect();
//! for (category, action) in optimizer.optimize_complete_budget(&context, &budgets) {
//!     println!("{category}: {:.0} -> {:.0}", action.current_amount, action.recommended_amount);
//! }
//! ```

pub mod action;
pub mod category;
pub mod config;
pub mod constraints;
pub mod context;
pub mod error;
pub mod models;
pub mod optimizer;
pub mod policy;
pub mod reasoning;
pub mod reward;
pub mod store;

pub use action::{ActionSpace, BudgetAction};
pub use category::{Category, CategoryGroup};
pub use config::OptimizerConfig;
pub use context::{RiskTolerance, UserContext};
pub use error::{ConfigError, ModelError, StateError};
pub use optimizer::{ContextualBudgetOptimizer, FeedbackReport, SharedOptimizer};
pub use policy::RandomSource;
pub use reasoning::{BudgetInsights, RiskLevel};
pub use reward::Outcome;
