//! Linear warmup learning rate scheduler

use super::{serde_state, LRScheduler};
use crate::optim::Optimizer;
use serde::{Deserialize, Serialize};

/// Linearly increases the learning rate from 0 to `lr_target` over
/// `warmup_steps`, then holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearWarmupLR {
    lr_target: f32,
    warmup_steps: usize,
    current_step: usize,
}

impl LinearWarmupLR {
    pub fn new(lr_target: f32, warmup_steps: usize) -> Self {
        Self { lr_target, warmup_steps, current_step: 0 }
    }
}

impl LRScheduler for LinearWarmupLR {
    fn get_lr(&self) -> f32 {
        if self.warmup_steps == 0 {
            return self.lr_target;
        }
        let progress = (self.current_step as f32 / self.warmup_steps as f32).min(1.0);
        self.lr_target * progress
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
