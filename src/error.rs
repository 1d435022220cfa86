use std::path::PathBuf;
use thiserror::Error;

/// Why a reward model could not produce (or absorb) an estimate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("reward model has not been trained yet")]
    NotReady,

    #[error("feature vector has {got} entries, model expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("reward model produced a non-finite estimate")]
    NonFinite,
}

/// Failures while persisting or restoring optimizer state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not (de)serialize '{}': {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("persisted state is incompatible: {message}")]
    Incompatible { message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}
