//! Loss-scaling configuration

use super::Precision;
use serde::{Deserialize, Serialize};

/// Configuration for mixed-precision loss scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixedPrecisionConfig {
    /// Precision for the forward pass
    pub compute_precision: Precision,
    /// Initial loss scale factor
    pub initial_scale: f32,
    /// Factor to increase scale by after `scale_growth_interval` clean steps
    pub scale_growth_factor: f32,
    /// Factor to decrease scale by on overflow
    pub scale_backoff_factor: f32,
    /// Number of successful steps before increasing scale
    pub scale_growth_interval: usize,
    /// Whether to use dynamic loss scaling
    pub dynamic_scaling: bool,
}

impl MixedPrecisionConfig {
    /// Full precision, no scaling
    pub fn fp32() -> Self {
        Self {
            compute_precision: Precision::Fp32,
            initial_scale: 1.0,
            scale_growth_factor: 2.0,
            scale_backoff_factor: 0.5,
            scale_growth_interval: 2000,
            dynamic_scaling: false,
        }
    }

    /// fp16 autocast with dynamic scaling from 2^16
    pub fn fp16() -> Self {
        Self {
            compute_precision: Precision::Fp16,
            initial_scale: 65536.0,
            dynamic_scaling: true,
            ..Self::fp32()
        }
    }

    /// bf16 autocast, no scaling
    pub fn bf16() -> Self {
        Self { compute_precision: Precision::Bf16, ..Self::fp32() }
    }

    /// Defaults for a precision policy
    pub fn for_precision(precision: Precision) -> Self {
        match precision {
            Precision::Fp32 => Self::fp32(),
            Precision::Fp16 => Self::fp16(),
            Precision::Bf16 => Self::bf16(),
        }
    }

    /// Set initial loss scale
    pub fn with_initial_scale(mut self, scale: f32) -> Self {
        self.initial_scale = scale;
        self
    }

    /// Set growth interval
    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.scale_growth_interval = interval;
        self
    }
}

impl Default for MixedPrecisionConfig {
    fn default() -> Self {
        Self::fp32()
    }
}
