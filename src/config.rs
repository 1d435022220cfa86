//! Optimizer tunables.
//!
//! Every field has a default so a config file only needs to name what it
//! overrides. Constraint tables are not configuration; they live in
//! [`crate::constraints`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

// Exploration schedule
const INITIAL_EXPLORATION_RATE: f64 = 0.1;
const EXPLORATION_DECAY: f64 = 0.995; // applied once per feedback batch
const EXPLORATION_FLOOR: f64 = 0.05;

// Portfolio rescaling
const SAFETY_MARGIN: f64 = 0.05; // keep 5% of income unallocated
const RESCALE_FLOOR: f64 = 0.7; // never cut discretionary by more than 30% in one pass
const RESCALE_CONFIDENCE_FACTOR: f64 = 0.9;

// Reward models
const BATCH_REFIT_SIZE: usize = 10;
const RIDGE_ALPHA: f64 = 1.0;
const FOREST_TREES: usize = 50;
const FOREST_MAX_DEPTH: usize = 10;
const FOREST_SEED: u64 = 42;

// Feature normalization
const INCOME_SCALE: f64 = 100_000.0;
const BUDGET_SCALE: f64 = 10_000.0;
const GOALS_CAP: f64 = 10.0;

// Confidence
const EXPLORE_CONFIDENCE: f64 = 0.3;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const EXPLOIT_CONFIDENCE_MIN: f64 = 0.1;
const EXPLOIT_CONFIDENCE_MAX: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub initial_exploration_rate: f64,
    pub exploration_decay: f64,
    pub exploration_floor: f64,
    pub safety_margin: f64,
    pub rescale_floor: f64,
    pub rescale_confidence_factor: f64,
    pub batch_refit_size: usize,
    pub ridge_alpha: f64,
    pub forest_trees: usize,
    pub forest_max_depth: usize,
    pub forest_seed: u64,
    pub income_scale: f64,
    pub budget_scale: f64,
    pub goals_cap: f64,
    pub explore_confidence: f64,
    pub fallback_confidence: f64,
    pub exploit_confidence_min: f64,
    pub exploit_confidence_max: f64,
    /// Seed for the explore/exploit draws. `None` seeds from OS entropy.
    pub policy_seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            initial_exploration_rate: INITIAL_EXPLORATION_RATE,
            exploration_decay: EXPLORATION_DECAY,
            exploration_floor: EXPLORATION_FLOOR,
            safety_margin: SAFETY_MARGIN,
            rescale_floor: RESCALE_FLOOR,
            rescale_confidence_factor: RESCALE_CONFIDENCE_FACTOR,
            batch_refit_size: BATCH_REFIT_SIZE,
            ridge_alpha: RIDGE_ALPHA,
            forest_trees: FOREST_TREES,
            forest_max_depth: FOREST_MAX_DEPTH,
            forest_seed: FOREST_SEED,
            income_scale: INCOME_SCALE,
            budget_scale: BUDGET_SCALE,
            goals_cap: GOALS_CAP,
            explore_confidence: EXPLORE_CONFIDENCE,
            fallback_confidence: FALLBACK_CONFIDENCE,
            exploit_confidence_min: EXPLOIT_CONFIDENCE_MIN,
            exploit_confidence_max: EXPLOIT_CONFIDENCE_MAX,
            policy_seed: None,
        }
    }
}

impl OptimizerConfig {
    /// Load a config from `path`. A missing file yields the defaults; a file
    /// that exists but does not parse or validate is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no optimizer config found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: OptimizerConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn unit(field: &'static str, v: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    message: format!("{v} is outside [0, 1]"),
                })
            }
        }
        fn positive(field: &'static str, v: f64) -> Result<(), ConfigError> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    message: format!("{v} must be a positive number"),
                })
            }
        }

        unit("initial_exploration_rate", self.initial_exploration_rate)?;
        unit("exploration_decay", self.exploration_decay)?;
        unit("exploration_floor", self.exploration_floor)?;
        unit("safety_margin", self.safety_margin)?;
        unit("rescale_floor", self.rescale_floor)?;
        unit("rescale_confidence_factor", self.rescale_confidence_factor)?;
        unit("explore_confidence", self.explore_confidence)?;
        unit("fallback_confidence", self.fallback_confidence)?;
        unit("exploit_confidence_min", self.exploit_confidence_min)?;
        unit("exploit_confidence_max", self.exploit_confidence_max)?;
        positive("ridge_alpha", self.ridge_alpha)?;
        positive("income_scale", self.income_scale)?;
        positive("budget_scale", self.budget_scale)?;
        positive("goals_cap", self.goals_cap)?;

        if self.exploit_confidence_min > self.exploit_confidence_max {
            return Err(ConfigError::Invalid {
                field: "exploit_confidence_min",
                message: "must not exceed exploit_confidence_max".to_string(),
            });
        }
        if self.batch_refit_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_refit_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.forest_trees == 0 || self.forest_max_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "forest_trees",
                message: "forest needs at least one tree of depth >= 1".to_string(),
            });
        }
        if self.initial_exploration_rate < self.exploration_floor {
            warn!(
                initial = self.initial_exploration_rate,
                floor = self.exploration_floor,
                "initial exploration rate below floor, it will be raised to the floor"
            );
        }
        Ok(())
    }
}
