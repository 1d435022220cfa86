//! Persist and restore optimizer state.
//!
//! Layout inside the caller's directory:
//! - `{category}_reward_model.json` per category
//! - `feature_scaler.json`
//! - `metadata.json` (categories, action space, exploration rate, model
//!   performance, save timestamp)

use crate::action::ActionSpace;
use crate::category::Category;
use crate::context::ACTION_FEATURES;
use crate::error::StateError;
use crate::models::{new_model, FeatureScaler, ModelKind, ModelPerformance, ModelSnapshot, RewardModel};
use crate::optimizer::ContextualBudgetOptimizer;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FORMAT_VERSION: u32 = 2;
const METADATA_FILE: &str = "metadata.json";
const SCALER_FILE: &str = "feature_scaler.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub format_version: u32,
    pub categories: Vec<Category>,
    pub action_space: ActionSpace,
    pub exploration_rate: f64,
    #[serde(default)]
    pub model_performance: BTreeMap<Category, ModelPerformance>,
    pub saved_at: DateTime<Utc>,
}

fn model_path(dir: &Path, category: Category) -> PathBuf {
    dir.join(format!("{category}_reward_model.json"))
}

// Write to a sibling temp file, then rename over the target.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StateError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// `Ok(None)` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let contents = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| StateError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}

fn incompatible(message: impl Into<String>) -> StateError {
    StateError::Incompatible {
        message: message.into(),
    }
}

impl ContextualBudgetOptimizer {
    pub fn save_state(&self, dir: impl AsRef<Path>) -> Result<(), StateError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| StateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for (category, snapshot) in self.bank().snapshots() {
            write_json(&model_path(dir, category), &snapshot)?;
        }
        write_json(&dir.join(SCALER_FILE), self.bank().scaler())?;

        let metadata = StateMetadata {
            format_version: FORMAT_VERSION,
            categories: self.categories().to_vec(),
            action_space: self.action_space().clone(),
            exploration_rate: self.exploration_rate(),
            model_performance: self.bank().performance().clone(),
            saved_at: Utc::now(),
        };
        write_json(&dir.join(METADATA_FILE), &metadata)?;

        info!(path = %dir.display(), exploration_rate = metadata.exploration_rate, "budget optimizer state saved");
        Ok(())
    }

    /// Restore state saved by [`save_state`](Self::save_state).
    ///
    /// Everything is read and checked before anything is replaced, so on
    /// error the optimizer keeps its current state.
    pub fn load_state(&mut self, dir: impl AsRef<Path>) -> Result<(), StateError> {
        let dir = dir.as_ref();
        let metadata_path = dir.join(METADATA_FILE);
        let metadata: StateMetadata = read_json(&metadata_path)?.ok_or_else(|| StateError::Io {
            path: metadata_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "metadata file is missing"),
        })?;

        if metadata.format_version != FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} (expected {FORMAT_VERSION})",
                metadata.format_version
            )));
        }
        if metadata.categories != self.categories() {
            return Err(incompatible("category list differs from this optimizer"));
        }
        if &metadata.action_space != self.action_space() {
            return Err(incompatible("action space differs from this optimizer"));
        }
        if !metadata.exploration_rate.is_finite() {
            return Err(incompatible("exploration rate is not a number"));
        }

        let mut snapshots = Vec::with_capacity(Category::COUNT);
        for category in Category::ALL {
            let expected = ModelKind::for_category(category);
            let snapshot = match read_json::<ModelSnapshot>(&model_path(dir, category))? {
                Some(s) => s,
                None => {
                    warn!(category = %category, "no saved reward model, starting fresh");
                    new_model(expected, self.config()).snapshot()
                }
            };
            if snapshot.kind() != expected {
                return Err(incompatible(format!(
                    "{category} model is {:?}, expected {expected:?}",
                    snapshot.kind()
                )));
            }
            if !snapshot.is_consistent(ACTION_FEATURES) {
                return Err(incompatible(format!("{category} model is corrupt")));
            }
            snapshots.push((category, snapshot));
        }

        let scaler = match read_json::<FeatureScaler>(&dir.join(SCALER_FILE))? {
            Some(s) => s,
            None => {
                warn!("no saved feature scaler, starting fresh");
                FeatureScaler::new(ACTION_FEATURES)
            }
        };
        if scaler.dim() != ACTION_FEATURES || !scaler.is_consistent() {
            return Err(incompatible("feature scaler is corrupt"));
        }

        let floor = self.config().exploration_floor;
        let state = self.state_mut();
        state.bank.restore(snapshots, scaler, metadata.model_performance);
        state.exploration_rate = metadata.exploration_rate.clamp(floor, 1.0);

        info!(
            path = %dir.display(),
            saved_at = %metadata.saved_at,
            exploration_rate = state.exploration_rate,
            "budget optimizer state loaded"
        );
        Ok(())
    }
}
