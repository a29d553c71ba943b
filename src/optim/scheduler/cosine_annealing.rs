//! Cosine annealing learning rate scheduler

use super::{serde_state, LRScheduler};
use crate::optim::Optimizer;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Cosine Annealing Learning Rate Scheduler
///
/// Formula: lr_t = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(π * t / T))
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosineAnnealingLR {
    lr_max: f32,
    lr_min: f32,
    t_max: usize,
    current_step: usize,
}

impl CosineAnnealingLR {
    /// Create a new cosine annealing scheduler over `t_max` steps
    pub fn new(lr_max: f32, t_max: usize, lr_min: f32) -> Self {
        Self { lr_max, lr_min, t_max, current_step: 0 }
    }
}

impl LRScheduler for CosineAnnealingLR {
    fn get_lr(&self) -> f32 {
        if self.current_step >= self.t_max {
            return self.lr_min;
        }
        let progress = self.current_step as f32 / self.t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine_decay
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_endpoints() {
        let mut sched = CosineAnnealingLR::new(1.0, 2, 0.0);
        assert!((sched.get_lr() - 1.0).abs() < 1e-6);
        let mut opt = crate::optim::SGD::new(1.0, 0.0);
        sched.step(&mut opt);
        assert!((sched.get_lr() - 0.5).abs() < 1e-6);
        sched.step(&mut opt);
        assert_eq!(sched.get_lr(), 0.0);
        assert_eq!(opt.lr(), 0.0);
    }
}
