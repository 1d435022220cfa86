use super::{FeatureScaler, ModelKind, ModelSnapshot, ModelUpdate, RewardModel};
use crate::error::ModelError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f64>,
    pub reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree stored as a flat node arena, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(samples: &[Sample], indices: &[usize], max_depth: usize) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(samples, indices.to_vec(), 0, max_depth);
        tree
    }

    fn grow(&mut self, samples: &[Sample], indices: Vec<usize>, depth: usize, max_depth: usize) -> usize {
        let id = self.nodes.len();
        let mean = indices.iter().map(|&i| samples[i].reward).sum::<f64>() / indices.len() as f64;
        self.nodes.push(TreeNode::Leaf { value: mean });

        if depth >= max_depth || indices.len() < 2 {
            return id;
        }
        let Some((feature, threshold)) = best_split(samples, &indices) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| samples[i].features[feature] <= threshold);
        let left = self.grow(samples, left, depth + 1, max_depth);
        let right = self.grow(samples, right, depth + 1, max_depth);
        self.nodes[id] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn is_consistent(&self, dim: usize) -> bool {
        // children always have larger ids than their parent, so traversal terminates
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(id, node)| match node {
                TreeNode::Leaf { value } => value.is_finite(),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < dim
                        && threshold.is_finite()
                        && *left > id
                        && *right > id
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

/// Lowest summed squared error split over every feature, if any split
/// actually reduces the error.
fn best_split(samples: &[Sample], indices: &[usize]) -> Option<(usize, f64)> {
    let n = indices.len() as f64;
    let total: f64 = indices.iter().map(|&i| samples[i].reward).sum();
    let total_sq: f64 = indices.iter().map(|&i| samples[i].reward.powi(2)).sum();
    let parent_sse = total_sq - total * total / n;
    if parent_sse <= 1e-12 {
        return None;
    }

    let dim = samples[indices[0]].features.len();
    let mut best: Option<(usize, f64, f64)> = None;
    let mut column: Vec<(f64, f64)> = Vec::with_capacity(indices.len());

    for feature in 0..dim {
        column.clear();
        column.extend(indices.iter().map(|&i| (samples[i].features[feature], samples[i].reward)));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        for k in 0..column.len() - 1 {
            left_sum += column[k].1;
            left_sq += column[k].1 * column[k].1;
            if column[k].0 == column[k + 1].0 {
                continue;
            }
            let left_n = (k + 1) as f64;
            let right_n = n - left_n;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n) + (right_sq - right_sum * right_sum / right_n);
            if best.map_or(true, |(_, _, b)| sse < b) {
                best = Some((feature, (column[k].0 + column[k + 1].0) / 2.0, sse));
            }
        }
    }

    best.filter(|&(_, _, sse)| sse < parent_sse - 1e-12)
        .map(|(feature, threshold, _)| (feature, threshold))
}

/// Bagged regression trees, refit from scratch once enough observations
/// have been buffered. The buffer is cleared after each refit.
///
/// `pending` holds raw features. A refit freezes the scaling it trained
/// under in `scaler`, and predictions go through that same scaling until the
/// next refit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    dim: usize,
    n_trees: usize,
    max_depth: usize,
    seed: u64,
    batch_size: usize,
    trees: Vec<RegressionTree>,
    scaler: FeatureScaler,
    pending: Vec<Sample>,
    refits: u64,
}

impl RandomForest {
    pub fn new(dim: usize, n_trees: usize, max_depth: usize, seed: u64, batch_size: usize) -> Self {
        RandomForest {
            dim,
            n_trees,
            max_depth,
            seed,
            batch_size,
            trees: Vec::new(),
            scaler: FeatureScaler::new(dim),
            pending: Vec::new(),
            refits: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn refits(&self) -> u64 {
        self.refits
    }

    /// Replace the ensemble with one trained on raw `samples` seen through
    /// `scaler`, which is kept for later predictions.
    pub fn fit(&mut self, samples: &[Sample], scaler: FeatureScaler) -> Result<(), ModelError> {
        if samples.is_empty() {
            return Ok(());
        }
        if scaler.dim() != self.dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim,
                got: scaler.dim(),
            });
        }
        let scaled = samples
            .iter()
            .map(|s| {
                Ok(Sample {
                    features: scaler.transform(&s.features)?,
                    reward: s.reward,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        // same seed every refit, so identical batches give identical forests
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = scaled.len();
        self.trees = (0..self.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(&scaled, &bootstrap, self.max_depth)
            })
            .collect();
        self.scaler = scaler;
        self.refits += 1;
        Ok(())
    }

    pub(crate) fn is_consistent(&self, dim: usize) -> bool {
        self.dim == dim
            && self.batch_size > 0
            && self.scaler.dim() == dim
            && self.scaler.is_consistent()
            && self.trees.iter().all(|t| t.is_consistent(dim))
            && self
                .pending
                .iter()
                .all(|s| s.features.len() == dim && s.reward.is_finite())
    }
}

impl RewardModel for RandomForest {
    fn kind(&self) -> ModelKind {
        ModelKind::Ensemble
    }

    fn is_ready(&self) -> bool {
        !self.trees.is_empty()
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if !self.is_ready() {
            return Err(ModelError::NotReady);
        }
        if features.len() != self.dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim,
                got: features.len(),
            });
        }
        let scaled = self.scaler.transform(features)?;
        let y = self.trees.iter().map(|t| t.predict(&scaled)).sum::<f64>() / self.trees.len() as f64;
        if y.is_finite() {
            Ok(y)
        } else {
            Err(ModelError::NonFinite)
        }
    }

    fn update(&mut self, features: &[f64], reward: f64, scaling: &FeatureScaler) -> Result<ModelUpdate, ModelError> {
        if features.len() != self.dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim,
                got: features.len(),
            });
        }
        if !reward.is_finite() || features.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }

        self.pending.push(Sample {
            features: features.to_vec(),
            reward,
        });
        if self.pending.len() < self.batch_size {
            return Ok(ModelUpdate::Buffered {
                pending: self.pending.len(),
            });
        }

        let batch = std::mem::take(&mut self.pending);
        if let Err(e) = self.fit(&batch, scaling.clone()) {
            self.pending = batch;
            return Err(e);
        }
        Ok(ModelUpdate::Refit { samples: batch.len() })
    }

    fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::Ensemble(self.clone())
    }
}
