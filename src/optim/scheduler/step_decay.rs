//! Step decay learning rate scheduler

use super::{serde_state, LRScheduler};
use crate::optim::Optimizer;
use serde::{Deserialize, Serialize};

/// Multiplies the learning rate by `gamma` every `step_size` steps.
///
/// Formula: lr_t = lr_initial * gamma^(floor(t / step_size))
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDecayLR {
    lr_initial: f32,
    gamma: f32,
    step_size: usize,
    current_step: usize,
}

impl StepDecayLR {
    pub fn new(lr_initial: f32, step_size: usize, gamma: f32) -> Self {
        Self { lr_initial, gamma, step_size, current_step: 0 }
    }
}

impl LRScheduler for StepDecayLR {
    fn get_lr(&self) -> f32 {
        if self.step_size == 0 {
            return self.lr_initial;
        }
        let num_decays = self.current_step / self.step_size;
        self.lr_initial * self.gamma.powi(num_decays as i32)
    }

    fn last_step(&self) -> usize {
        self.current_step
    }

    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.current_step += 1;
        optimizer.set_lr(self.get_lr());
    }

    serde_state!();
}
