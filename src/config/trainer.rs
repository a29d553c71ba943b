//! Trainer configuration schema

use super::validate::validate_config;
use crate::precision::{MixedPrecisionConfig, Precision};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Progress renderer style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgbarKind {
    /// Single-line bar with ETA, redrawn every step
    #[default]
    Keras,
    /// One log line every `interval` steps
    Log,
}

/// Progress callback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub kind: ProgbarKind,
    /// Bar width in characters
    pub width: usize,
    /// Steps between lines for [`ProgbarKind::Log`]
    pub interval: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { kind: ProgbarKind::Keras, width: 30, interval: 100 }
    }
}

/// Metric smoothing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Steps averaged before the running window resets
    pub interval: usize,
    /// Metrics shown raw instead of smoothed
    pub stateful_metrics: Vec<String>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { interval: 100, stateful_metrics: vec!["lr".to_string()] }
    }
}

/// Diagnostics attempted when `fit` fails
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Save a checkpoint here before re-raising
    pub checkpoint_dir: Option<PathBuf>,
    /// Persist the last fetched batch here
    pub batch_path: Option<PathBuf>,
    /// Send a notification through the configured notifier
    pub notify: bool,
    /// Notification subject
    pub subject: Option<String>,
}

/// Complete trainer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Forward precision policy
    pub precision: Precision,

    /// Loss scaler parameters; defaults follow `precision`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaler: Option<MixedPrecisionConfig>,

    /// Micro-batches per optimizer step
    pub grad_accumulation_steps: usize,

    /// Global gradient norm limit
    #[serde(alias = "max_grad_norm", skip_serializing_if = "Option::is_none")]
    pub clip_grad_norm: Option<f32>,

    /// Keep the autograd graph alive after backward
    pub retain_graph: bool,

    /// Log the first fetched batch at info level
    pub log_first_step: bool,

    /// Show loss-detail columns in the progress bar
    pub loss2metrics: bool,

    pub progbar: ProgressConfig,

    /// `None` disables the default smoothing callback
    pub smoothing: Option<SmoothingConfig>,

    /// Ranks allowed to print and run callbacks
    pub master_ranks: Vec<usize>,

    /// Run callbacks on every rank, not only on master ranks
    pub workers_run_callbacks: bool,

    pub on_error: FaultConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            precision: Precision::Fp32,
            scaler: None,
            grad_accumulation_steps: 1,
            clip_grad_norm: None,
            retain_graph: false,
            log_first_step: false,
            loss2metrics: true,
            progbar: ProgressConfig::default(),
            smoothing: Some(SmoothingConfig::default()),
            master_ranks: vec![0],
            workers_run_callbacks: false,
            on_error: FaultConfig::default(),
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML (or `.json`) file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        validate_config(self)?;
        Ok(())
    }

    /// Scaler settings for the configured precision
    pub fn scaler_config(&self) -> MixedPrecisionConfig {
        self.scaler.clone().unwrap_or_else(|| MixedPrecisionConfig::for_precision(self.precision))
    }

    /// Apply every override that is set
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(precision) = overrides.precision {
            self.precision = precision;
        }
        if let Some(steps) = overrides.grad_accumulation_steps {
            self.grad_accumulation_steps = steps;
        }
        if let Some(clip) = overrides.clip_grad_norm {
            self.clip_grad_norm = clip;
        }
        if let Some(kind) = overrides.progbar_kind {
            self.progbar.kind = kind;
        }
        if let Some(smoothing) = overrides.smoothing {
            self.smoothing = smoothing;
        }
        if let Some(log_first_step) = overrides.log_first_step {
            self.log_first_step = log_first_step;
        }
        if let Some(retain_graph) = overrides.retain_graph {
            self.retain_graph = retain_graph;
        }
        if let Some(ranks) = overrides.master_ranks {
            self.master_ranks = ranks;
        }
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_grad_accumulation(mut self, steps: usize) -> Self {
        self.grad_accumulation_steps = steps;
        self
    }

    pub fn with_clip_grad_norm(mut self, max_norm: f32) -> Self {
        self.clip_grad_norm = Some(max_norm);
        self
    }

    pub fn with_smoothing(mut self, smoothing: Option<SmoothingConfig>) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_progbar(mut self, kind: ProgbarKind) -> Self {
        self.progbar.kind = kind;
        self
    }

    pub fn with_scaler(mut self, scaler: MixedPrecisionConfig) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_log_first_step(mut self, enabled: bool) -> Self {
        self.log_first_step = enabled;
        self
    }
}

/// Optional overrides layered on top of a loaded config.
///
/// Double options distinguish "leave as is" (`None`) from "unset"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub precision: Option<Precision>,
    pub grad_accumulation_steps: Option<usize>,
    pub clip_grad_norm: Option<Option<f32>>,
    pub progbar_kind: Option<ProgbarKind>,
    pub smoothing: Option<Option<SmoothingConfig>>,
    pub log_first_step: Option<bool>,
    pub retain_graph: Option<bool>,
    pub master_ranks: Option<Vec<usize>>,
}
