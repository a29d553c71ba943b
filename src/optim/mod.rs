//! Optimizer, scheduler and gradient-clipping collaborators

mod clip;
mod optimizer;
mod scheduler;
mod sgd;

pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;
pub use scheduler::{CosineAnnealingLR, LRScheduler, LinearWarmupLR, StepDecayLR};
pub use sgd::SGD;
