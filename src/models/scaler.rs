use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// Running standard scaler (Welford mean/variance).
///
/// The bank keeps one over every feedback observation; each model trains
/// and predicts through its own frozen copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl FeatureScaler {
    pub fn new(dim: usize) -> Self {
        FeatureScaler {
            count: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn samples_seen(&self) -> u64 {
        self.count
    }

    pub fn partial_fit(&mut self, features: &[f64]) -> Result<(), ModelError> {
        self.check_dim(features)?;
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        self.count += 1;
        let n = self.count as f64;
        for ((x, mean), m2) in features.iter().zip(self.mean.iter_mut()).zip(self.m2.iter_mut()) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
        Ok(())
    }

    /// Identity until two samples have been seen; zero-variance columns are
    /// only centered.
    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        self.check_dim(features)?;
        if self.count < 2 {
            return Ok(features.to_vec());
        }
        let n = self.count as f64;
        Ok(features
            .iter()
            .zip(&self.mean)
            .zip(&self.m2)
            .map(|((x, mean), m2)| {
                let std = (m2 / n).sqrt();
                let scale = if std > 1e-12 { std } else { 1.0 };
                (x - mean) / scale
            })
            .collect())
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.mean.len() == self.m2.len()
            && self.mean.iter().chain(&self.m2).all(|v| v.is_finite())
            && self.m2.iter().all(|v| *v >= 0.0)
    }

    fn check_dim(&self, features: &[f64]) -> Result<(), ModelError> {
        if features.len() != self.dim() {
            return Err(ModelError::DimensionMismatch {
                expected: self.dim(),
                got: features.len(),
            });
        }
        Ok(())
    }
}
