//! Learning rate schedulers
//!
//! - `CosineAnnealingLR` - Smooth cosine decay
//! - `LinearWarmupLR` - Linear warmup from 0 to target
//! - `StepDecayLR` - Step decay by factor every N steps

/// Implements the state methods through serde for schedulers whose whole
/// struct is their state.
macro_rules! serde_state {
    () => {
        fn state_dict(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }

        fn load_state_dict(&mut self, state: &serde_json::Value) -> crate::Result<()> {
            *self = serde_json::from_value(state.clone())?;
            Ok(())
        }
    };
}
pub(crate) use serde_state;

mod cosine_annealing;
mod linear_warmup;
mod step_decay;

pub use cosine_annealing::CosineAnnealingLR;
pub use linear_warmup::LinearWarmupLR;
pub use step_decay::StepDecayLR;

use super::Optimizer;
use crate::Result;
use serde_json::Value;

/// Learning rate scheduler trait
///
/// The trainer calls [`LRScheduler::step`] once per optimizer update, after
/// the optimizer has stepped, and never when a loss-scaler overflow
/// skipped the update.
pub trait LRScheduler {
    /// Learning rate for the current step
    fn get_lr(&self) -> f32;

    /// Number of completed steps
    fn last_step(&self) -> usize;

    /// Advance one step and apply the new rate to `optimizer`
    fn step(&mut self, optimizer: &mut dyn Optimizer);

    /// Serializable snapshot
    fn state_dict(&self) -> Value;

    /// Restore a snapshot produced by [`LRScheduler::state_dict`]
    fn load_state_dict(&mut self, state: &Value) -> Result<()>;
}
