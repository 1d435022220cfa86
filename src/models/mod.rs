//! Per-category reward models.
//!
//! Investment and savings get an online ridge regressor; every other
//! category gets a batch-refit random forest. Both sit behind
//! [`RewardModel`]. The bank keeps a running [`FeatureScaler`] over all
//! feedback; a model copies it when it trains and keeps that copy, so one
//! category's feedback never moves another category's predictions.

mod forest;
mod linear;
mod scaler;

pub use forest::{RandomForest, Sample};
pub use linear::OnlineRidge;
pub use scaler::FeatureScaler;

use crate::category::Category;
use crate::config::OptimizerConfig;
use crate::context::ACTION_FEATURES;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Incremental, every update is applied immediately.
    Linear,
    /// Buffered, refit from scratch once a batch is full.
    Ensemble,
}

impl ModelKind {
    pub fn for_category(category: Category) -> Self {
        if category.is_investment() {
            ModelKind::Linear
        } else {
            ModelKind::Ensemble
        }
    }
}

/// What an `update` call did with the observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelUpdate {
    Applied,
    Buffered { pending: usize },
    Refit { samples: usize },
}

pub trait RewardModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// False until the model has been fitted at least once.
    fn is_ready(&self) -> bool;

    /// `features` are raw; the model applies its own frozen scaling.
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Feed one raw observation. `scaling` is the bank's current scaler,
    /// which the model may copy when it (re)trains.
    fn update(&mut self, features: &[f64], reward: f64, scaling: &FeatureScaler) -> Result<ModelUpdate, ModelError>;

    fn snapshot(&self) -> ModelSnapshot;
}

/// Serializable form of any reward model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSnapshot {
    Linear(OnlineRidge),
    Ensemble(RandomForest),
}

impl ModelSnapshot {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSnapshot::Linear(_) => ModelKind::Linear,
            ModelSnapshot::Ensemble(_) => ModelKind::Ensemble,
        }
    }

    /// Structural sanity check before a snapshot replaces a live model.
    pub fn is_consistent(&self, dim: usize) -> bool {
        match self {
            ModelSnapshot::Linear(m) => m.is_consistent(dim),
            ModelSnapshot::Ensemble(m) => m.is_consistent(dim),
        }
    }

    pub fn into_model(self) -> Box<dyn RewardModel> {
        match self {
            ModelSnapshot::Linear(m) => Box::new(m),
            ModelSnapshot::Ensemble(m) => Box::new(m),
        }
    }
}

/// Running feedback statistics for one category's model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub updates: u64,
    pub mean_reward: f64,
    pub last_reward: f64,
}

impl ModelPerformance {
    fn record(&mut self, reward: f64) {
        self.updates += 1;
        self.mean_reward += (reward - self.mean_reward) / self.updates as f64;
        self.last_reward = reward;
    }
}

pub fn new_model(kind: ModelKind, config: &OptimizerConfig) -> Box<dyn RewardModel> {
    match kind {
        ModelKind::Linear => Box::new(OnlineRidge::new(ACTION_FEATURES, config.ridge_alpha)),
        ModelKind::Ensemble => Box::new(RandomForest::new(
            ACTION_FEATURES,
            config.forest_trees,
            config.forest_max_depth,
            config.forest_seed,
            config.batch_refit_size,
        )),
    }
}

/// One model per category plus the running feedback scaler.
pub struct RewardModelBank {
    models: Vec<Box<dyn RewardModel>>,
    scaler: FeatureScaler,
    performance: BTreeMap<Category, ModelPerformance>,
}

impl RewardModelBank {
    pub fn new(config: &OptimizerConfig) -> Self {
        RewardModelBank {
            models: Category::ALL
                .iter()
                .map(|&c| new_model(ModelKind::for_category(c), config))
                .collect(),
            scaler: FeatureScaler::new(ACTION_FEATURES),
            performance: BTreeMap::new(),
        }
    }

    pub fn model(&self, category: Category) -> &dyn RewardModel {
        self.models[category.index()].as_ref()
    }

    pub fn is_ready(&self, category: Category) -> bool {
        self.model(category).is_ready()
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn performance(&self) -> &BTreeMap<Category, ModelPerformance> {
        &self.performance
    }

    pub fn predict(&self, category: Category, features: &[f64]) -> Result<f64, ModelError> {
        let model = self.model(category);
        if !model.is_ready() {
            return Err(ModelError::NotReady);
        }
        model.predict(features)
    }

    /// Feed one observation: the running scaler absorbs the raw features,
    /// then the category's model gets them along with that scaler.
    pub fn update(&mut self, category: Category, features: &[f64], reward: f64) -> Result<ModelUpdate, ModelError> {
        if !reward.is_finite() {
            return Err(ModelError::NonFinite);
        }
        self.scaler.partial_fit(features)?;
        let outcome = self.models[category.index()].update(features, reward, &self.scaler)?;
        self.performance.entry(category).or_default().record(reward);
        Ok(outcome)
    }

    pub fn snapshots(&self) -> Vec<(Category, ModelSnapshot)> {
        Category::ALL
            .iter()
            .map(|&c| (c, self.model(c).snapshot()))
            .collect()
    }

    /// Swap in restored state. Callers validate everything beforehand so the
    /// swap itself cannot fail halfway.
    pub(crate) fn restore(
        &mut self,
        snapshots: Vec<(Category, ModelSnapshot)>,
        scaler: FeatureScaler,
        performance: BTreeMap<Category, ModelPerformance>,
    ) {
        for (category, snapshot) in snapshots {
            self.models[category.index()] = snapshot.into_model();
        }
        self.scaler = scaler;
        self.performance = performance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_follows_category_group() {
        let bank = RewardModelBank::new(&OptimizerConfig::default());
        for c in Category::ALL {
            assert_eq!(bank.model(c).kind(), ModelKind::for_category(c));
            assert!(!bank.is_ready(c));
        }
        assert_eq!(ModelKind::for_category(Category::Savings), ModelKind::Linear);
        assert_eq!(ModelKind::for_category(Category::Food), ModelKind::Ensemble);
    }

    #[test]
    fn linear_categories_learn_immediately() {
        let mut bank = RewardModelBank::new(&OptimizerConfig::default());
        let features = vec![0.1; ACTION_FEATURES];
        assert_eq!(bank.predict(Category::Savings, &features), Err(ModelError::NotReady));
        assert_eq!(bank.update(Category::Savings, &features, 0.6), Ok(ModelUpdate::Applied));
        assert!(bank.predict(Category::Savings, &features).is_ok());
        assert_eq!(bank.performance()[&Category::Savings].updates, 1);
    }

    #[test]
    fn ensemble_categories_wait_for_a_full_batch() {
        let mut bank = RewardModelBank::new(&OptimizerConfig::default());
        for i in 0..9 {
            let mut features = vec![0.0; ACTION_FEATURES];
            features[0] = i as f64;
            bank.update(Category::Shopping, &features, 0.5).unwrap();
        }
        assert!(!bank.is_ready(Category::Shopping));
        let outcome = bank
            .update(Category::Shopping, &vec![9.0; ACTION_FEATURES], 0.5)
            .unwrap();
        assert_eq!(outcome, ModelUpdate::Refit { samples: 10 });
        assert!(bank.is_ready(Category::Shopping));
    }

    fn query_inputs() -> Vec<Vec<f64>> {
        (0..7)
            .map(|i| {
                let mut features = vec![0.3; ACTION_FEATURES];
                features[ACTION_FEATURES - 2] = -0.2 + 0.0625 * i as f64;
                features
            })
            .collect()
    }

    fn scores(bank: &RewardModelBank, category: Category) -> Vec<f64> {
        query_inputs()
            .iter()
            .map(|f| bank.predict(category, f).unwrap())
            .collect()
    }

    #[test]
    fn other_categories_feedback_leaves_predictions_alone() {
        let mut bank = RewardModelBank::new(&OptimizerConfig::default());
        for (i, features) in query_inputs().iter().take(3).enumerate() {
            bank.update(Category::Savings, features, 0.2 * i as f64).unwrap();
        }
        for i in 0..10 {
            let mut features = vec![0.3; ACTION_FEATURES];
            features[ACTION_FEATURES - 1] = i as f64;
            bank.update(Category::Shopping, &features, 0.1 * i as f64).unwrap();
        }
        let savings = scores(&bank, Category::Savings);
        let shopping = scores(&bank, Category::Shopping);

        for i in 0..20 {
            let mut features = vec![5.0 + i as f64; ACTION_FEATURES];
            features[0] = -40.0 * i as f64;
            bank.update(Category::Food, &features, 1.0).unwrap();
        }

        assert_eq!(scores(&bank, Category::Savings), savings);
        assert_eq!(scores(&bank, Category::Shopping), shopping);
        assert_eq!(bank.scaler().samples_seen(), 33);
    }

    #[test]
    fn ensemble_recalls_its_only_positive_sample() {
        let mut bank = RewardModelBank::new(&OptimizerConfig::default());
        let mut outlier = vec![0.0; ACTION_FEATURES];
        outlier[0] = 1_000.0;
        bank.update(Category::Shopping, &outlier, 1.0).unwrap();
        for i in 0..9 {
            let mut features = vec![0.0; ACTION_FEATURES];
            features[0] = i as f64;
            bank.update(Category::Shopping, &features, 0.0).unwrap();
        }

        let mut typical = vec![0.0; ACTION_FEATURES];
        typical[0] = 4.0;
        let high = bank.predict(Category::Shopping, &outlier).unwrap();
        assert!(high > 0.2, "outlier prediction {high}");
        assert_eq!(bank.predict(Category::Shopping, &typical).unwrap(), 0.0);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut bank = RewardModelBank::new(&OptimizerConfig::default());
        bank.update(Category::Investment, &vec![0.2; ACTION_FEATURES], 0.4).unwrap();
        for (_, snapshot) in bank.snapshots() {
            let json = serde_json::to_string(&snapshot).unwrap();
            let back: ModelSnapshot = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), snapshot.kind());
            assert!(back.is_consistent(ACTION_FEATURES));
        }
    }
}
