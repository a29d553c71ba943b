//! Error types for training orchestration.
//!
//! Every variant carries enough context to act on without reading the
//! source: which config field, which checkpoint artifact, which state key.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ajustar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the trainer, its collaborators and the checkpoint layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (steps_per_epoch not derivable,
    /// unsupported metric, zero accumulation steps...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The criterion returned a loss shape the step engine cannot normalize.
    #[error("Unsupported loss shape: {0}\n  → Return a scalar, a mapping with a 'loss' key, or a sequence with the loss first")]
    UnsupportedLoss(String),

    /// The data source stayed empty after an iterator rebuild.
    #[error("Data source is empty: exhausted twice while fetching batch for global step {global_step}")]
    EmptyDataSource { global_step: usize },

    /// `compile` was not called before `fit`/`train_step`.
    #[error("Trainer is not compiled\n  → Call compile() with a criterion and an optimizer first")]
    NotCompiled,

    /// One or more checkpoint artifacts failed to save or load.
    #[error("Checkpoint failed for {}", format_failures(.0))]
    Checkpoint(Vec<(String, String)>),

    /// Explicitly requested checkpoint file does not exist.
    #[error("Checkpoint artifact not found: {path}")]
    ArtifactNotFound { path: PathBuf },

    /// State dict keys or shapes do not match the module.
    #[error("State dict mismatch: {0}")]
    StateDict(String),

    /// Failure raised by the model, optimizer, scheduler or external engine.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Failure raised by a callback.
    #[error("Callback '{name}' failed: {message}")]
    Callback { name: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SafeTensors encode/decode error.
    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Shorthand for a collaborator failure.
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine(message.into())
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(artifact, message)| format!("{artifact} ({message})"))
        .collect::<Vec<_>>()
        .join(", ")
}
