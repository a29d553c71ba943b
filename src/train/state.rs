//! Run-loop counters

use serde::{Deserialize, Serialize};

/// Step and epoch counters owned by the run loop.
///
/// After every completed step,
/// `global_step == epoch * steps_per_epoch + local_step`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Step index across the whole run
    pub global_step: usize,
    /// Step index within the current epoch
    pub local_step: usize,
    /// Index into the current data iterator, reset when it is rebuilt
    pub batch_step: usize,
    pub epoch: usize,
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub total_steps: usize,
    /// First local step of the first epoch after a resume
    pub resume_step: usize,
    /// Epoch to resume from
    pub resume_epoch: usize,
    /// Checked once per epoch boundary
    pub stop_training: bool,
}

impl RunState {
    /// Local step the given epoch starts at
    pub fn start_step(&self, epoch: usize) -> usize {
        if epoch == self.resume_epoch {
            self.resume_step
        } else {
            0
        }
    }

    /// Move to `local_step` of the current epoch
    pub(crate) fn enter_step(&mut self, local_step: usize) {
        self.local_step = local_step;
        self.global_step = self.epoch * self.steps_per_epoch + local_step;
    }

    /// Whether this is the first step the current `fit` call executes
    pub fn is_first_step(&self) -> bool {
        self.global_step == self.resume_epoch * self.steps_per_epoch + self.resume_step
    }
}
