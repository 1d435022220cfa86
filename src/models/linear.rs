use super::{FeatureScaler, ModelKind, ModelSnapshot, ModelUpdate, RewardModel};
use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// Ridge regression fitted online with recursive least squares.
///
/// `inverse` holds `(alpha * I + sum z zᵀ)⁻¹` over the bias-augmented inputs
/// `z = [x, 1]`, row-major, so each observation is an O(d²) update and the
/// weights always equal the closed-form ridge solution on everything seen.
///
/// Inputs go through `scaler`, a copy of the bank's scaler frozen at the
/// first update, so every observation and every query share one scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineRidge {
    dim: usize,
    alpha: f64,
    weights: Vec<f64>,
    inverse: Vec<f64>,
    scaler: FeatureScaler,
    updates: u64,
}

impl OnlineRidge {
    pub fn new(dim: usize, alpha: f64) -> Self {
        let n = dim + 1;
        let mut inverse = vec![0.0; n * n];
        for i in 0..n {
            inverse[i * n + i] = 1.0 / alpha;
        }
        OnlineRidge {
            dim,
            alpha,
            weights: vec![0.0; n],
            inverse,
            scaler: FeatureScaler::new(dim),
            updates: 0,
        }
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Scaled inputs with the bias term appended.
    fn augmented(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.dim {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim,
                got: features.len(),
            });
        }
        let mut z = self.scaler.transform(features)?;
        z.push(1.0);
        Ok(z)
    }

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    pub(crate) fn is_consistent(&self, dim: usize) -> bool {
        let n = dim + 1;
        self.dim == dim
            && self.weights.len() == n
            && self.inverse.len() == n * n
            && self.alpha > 0.0
            && self.scaler.dim() == dim
            && self.scaler.is_consistent()
            && self.weights.iter().chain(&self.inverse).all(|v| v.is_finite())
    }
}

impl RewardModel for OnlineRidge {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn is_ready(&self) -> bool {
        self.updates > 0
    }

    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if !self.is_ready() {
            return Err(ModelError::NotReady);
        }
        let z = self.augmented(features)?;
        let y = Self::dot(&self.weights, &z);
        if y.is_finite() {
            Ok(y)
        } else {
            Err(ModelError::NonFinite)
        }
    }

    fn update(&mut self, features: &[f64], reward: f64, scaling: &FeatureScaler) -> Result<ModelUpdate, ModelError> {
        if !reward.is_finite() {
            return Err(ModelError::NonFinite);
        }
        if self.updates == 0 {
            if scaling.dim() != self.dim {
                return Err(ModelError::DimensionMismatch {
                    expected: self.dim,
                    got: scaling.dim(),
                });
            }
            self.scaler = scaling.clone();
        }
        let z = self.augmented(features)?;
        let n = z.len();

        let pz: Vec<f64> = (0..n)
            .map(|i| Self::dot(&self.inverse[i * n..(i + 1) * n], &z))
            .collect();
        let denom = 1.0 + Self::dot(&z, &pz);
        if !denom.is_finite() || denom <= 0.0 {
            return Err(ModelError::NonFinite);
        }
        let error = reward - Self::dot(&self.weights, &z);

        for (w, p) in self.weights.iter_mut().zip(&pz) {
            *w += p / denom * error;
        }
        for i in 0..n {
            for j in 0..n {
                self.inverse[i * n + j] -= pz[i] * pz[j] / denom;
            }
        }

        self.updates += 1;
        Ok(ModelUpdate::Applied)
    }

    fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::Linear(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(dim: usize) -> FeatureScaler {
        FeatureScaler::new(dim)
    }

    #[test]
    fn untrained_model_is_not_ready() {
        let model = OnlineRidge::new(2, 1.0);
        assert!(!model.is_ready());
        assert_eq!(model.predict(&[0.0, 0.0]), Err(ModelError::NotReady));
    }

    #[test]
    fn matches_closed_form_ridge_in_one_dimension() {
        // alpha = 1, inputs z = [x, 1]; one observation x=1, y=2.
        // (I + z zᵀ)⁻¹ zᵀ y with z = [1, 1] gives w = [2/3, 2/3].
        let mut model = OnlineRidge::new(1, 1.0);
        model.update(&[1.0], 2.0, &identity(1)).unwrap();
        assert_eq!(model.updates(), 1);
        let y = model.predict(&[1.0]).unwrap();
        assert!((y - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn converges_towards_linear_target() {
        let mut model = OnlineRidge::new(2, 1.0);
        for i in 0..200 {
            let a = (i % 7) as f64 / 7.0;
            let b = (i % 5) as f64 / 5.0;
            model.update(&[a, b], 0.5 * a - 0.25 * b + 0.1, &identity(2)).unwrap();
        }
        let y = model.predict(&[0.5, 0.5]).unwrap();
        assert!((y - 0.225).abs() < 0.02, "prediction {y}");
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut model = OnlineRidge::new(2, 1.0);
        assert!(matches!(
            model.update(&[1.0], 0.5, &identity(2)),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert_eq!(model.update(&[1.0, 1.0], f64::NAN, &identity(2)), Err(ModelError::NonFinite));
        assert!(!model.is_ready());
    }

    #[test]
    fn scaling_is_frozen_at_first_update() {
        let mut first = FeatureScaler::new(1);
        first.partial_fit(&[0.0]).unwrap();
        first.partial_fit(&[2.0]).unwrap();
        let mut later = first.clone();
        later.partial_fit(&[100.0]).unwrap();

        let mut model = OnlineRidge::new(1, 1.0);
        model.update(&[2.0], 1.0, &first).unwrap();
        let before = model.predict(&[2.0]).unwrap();
        model.update(&[0.0], 0.0, &later).unwrap();

        assert_eq!(model.scaler, first);
        // z = [1, 1] for x = 2 under the first scaling
        assert!((before - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(model.updates(), 2);
    }
}
