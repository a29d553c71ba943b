//! Optimizer trait

use crate::engine::Parameter;
use crate::Result;
use serde_json::Value;

/// Trait for optimization algorithms
///
/// Parameters are lent to the optimizer for each step; per-parameter state
/// is keyed by position, so callers must pass them in a stable order.
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [&mut dyn Parameter]) -> Result<()>;

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [&mut dyn Parameter]) {
        for param in params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Learning rate of every parameter group
    fn param_group_lrs(&self) -> Vec<f32> {
        vec![self.lr()]
    }

    /// Serializable snapshot of hyperparameters and per-parameter buffers
    fn state_dict(&self) -> Value;

    /// Restore a snapshot produced by [`Optimizer::state_dict`]
    fn load_state_dict(&mut self, state: &Value) -> Result<()>;
}
