//! Trainable module interface

use super::{LoadReport, Parameter, StateDict};
use crate::precision::Precision;
use crate::Result;

/// A model the trainer can drive.
///
/// Forward takes the batch input by reference so the trainer can keep the
/// last batch for fault diagnostics. Gradients flow back through
/// [`Differentiable::backward`](super::Differentiable::backward), which
/// writes into the slots exposed by [`Module::parameters_mut`].
pub trait Module {
    /// Batch input type
    type Input;
    /// Forward output type, consumed by the criterion and metrics
    type Output;

    /// Run the forward pass
    fn forward(&mut self, input: &Self::Input) -> Result<Self::Output>;

    /// Borrow all parameters in a stable order
    fn parameters(&self) -> Vec<&dyn Parameter>;

    /// Mutably borrow all parameters in the same order as [`Module::parameters`]
    fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter>;

    /// Switch between training and evaluation behaviour
    fn set_training(&mut self, training: bool);

    /// Whether the module is in training mode
    fn is_training(&self) -> bool;

    /// Enter (`Fp16`/`Bf16`) or leave (`Fp32`) a reduced-precision forward context
    fn autocast(&mut self, _precision: Precision) {}

    /// Snapshot every parameter
    fn state_dict(&self) -> StateDict {
        StateDict::from_parameters(self.parameters())
    }

    /// Restore parameters by name
    ///
    /// With `strict`, missing or unexpected keys are an error. Shape
    /// mismatches are always an error.
    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<LoadReport> {
        let mut params = self.parameters_mut();
        state.apply_to(&mut params, strict)
    }
}
