//! Dynamic loss scaler for fp16 training.

use super::MixedPrecisionConfig;
use crate::engine::Parameter;

/// Gradient scaler for mixed-precision training
///
/// Multiplies the loss before backward so small fp16 gradients do not
/// underflow, divides them back before the optimizer step, and backs off
/// the scale when an overflow is found.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    steps_since_growth: usize,
    dynamic: bool,
    overflow_count: usize,
    successful_steps: usize,
}

impl GradScaler {
    /// Create a scaler with default growth/backoff
    pub fn new(initial_scale: f32) -> Self {
        Self::from_config(&MixedPrecisionConfig::fp16().with_initial_scale(initial_scale))
    }

    pub fn from_config(config: &MixedPrecisionConfig) -> Self {
        Self {
            scale: config.initial_scale,
            growth_factor: config.scale_growth_factor,
            backoff_factor: config.scale_backoff_factor,
            growth_interval: config.scale_growth_interval,
            steps_since_growth: 0,
            dynamic: config.dynamic_scaling,
            overflow_count: 0,
            successful_steps: 0,
        }
    }

    /// Current scale
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Divide every gradient by the scale
    ///
    /// Returns true if all gradients are finite afterwards.
    pub fn unscale(&self, params: &mut [&mut dyn Parameter]) -> bool {
        let inv_scale = 1.0 / self.scale;
        let mut finite = true;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad_mut() {
                for g in grad.iter_mut() {
                    *g *= inv_scale;
                    if !g.is_finite() {
                        finite = false;
                    }
                }
            }
        }
        finite
    }

    /// Update the scale after a step; pass `true` if gradients were finite
    pub fn update(&mut self, grads_valid: bool) {
        if !self.dynamic {
            return;
        }

        if grads_valid {
            self.successful_steps += 1;
            self.steps_since_growth += 1;
            if self.steps_since_growth >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.steps_since_growth = 0;
            }
        } else {
            self.overflow_count += 1;
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.steps_since_growth = 0;
        }
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count
    }

    pub fn successful_steps(&self) -> usize {
        self.successful_steps
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(65536.0)
    }
}
