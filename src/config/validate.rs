//! Configuration validation

use super::TrainerConfig;
use crate::Error;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid grad_accumulation_steps: {0} (must be > 0)")]
    InvalidAccumulation(usize),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid smoothing interval: {0} (must be > 0)")]
    InvalidSmoothingInterval(usize),

    #[error("Invalid progress bar width: {0} (must be > 0)")]
    InvalidProgbarWidth(usize),

    #[error("Invalid initial loss scale: {0} (must be >= 1.0)")]
    InvalidLossScale(f32),

    #[error("master_ranks cannot be empty")]
    EmptyMasterRanks,
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Config(e.to_string())
    }
}

/// Check every field of a trainer configuration
pub fn validate_config(config: &TrainerConfig) -> Result<(), ValidationError> {
    if config.grad_accumulation_steps == 0 {
        return Err(ValidationError::InvalidAccumulation(0));
    }

    if let Some(clip) = config.clip_grad_norm {
        if clip <= 0.0 || !clip.is_finite() {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }

    if let Some(smoothing) = &config.smoothing {
        if smoothing.interval == 0 {
            return Err(ValidationError::InvalidSmoothingInterval(0));
        }
    }

    if config.progbar.width == 0 {
        return Err(ValidationError::InvalidProgbarWidth(0));
    }

    if let Some(scaler) = &config.scaler {
        if scaler.initial_scale < 1.0 {
            return Err(ValidationError::InvalidLossScale(scaler.initial_scale));
        }
    }

    if config.master_ranks.is_empty() {
        return Err(ValidationError::EmptyMasterRanks);
    }

    Ok(())
}
