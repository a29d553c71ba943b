//! Collaborator interfaces the trainer drives.
//!
//! The tensor/autograd engine is external: a trainable module exposes its
//! parameters as flat `f32` buffers with gradient slots, and a loss value
//! knows how to write its gradients into those slots.

mod loss;
mod module;
mod parameter;
mod state_dict;

pub use loss::{Differentiable, Scaled};
pub use module::Module;
pub use parameter::{Param, Parameter};
pub use state_dict::{LoadReport, StateDict, TensorData};
