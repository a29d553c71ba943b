//! Resume point persisted with a checkpoint

use crate::train::RunState;
use serde::{Deserialize, Serialize};

/// Where the next `fit` call continues.
///
/// Saved after a completed step: the resume point is the step after it,
/// rolling into the next epoch at the epoch boundary. Serialized as
/// exactly `{resume_step, resume_epoch}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepsRecord {
    pub resume_step: usize,
    pub resume_epoch: usize,
}

impl StepsRecord {
    pub fn from_state(state: &RunState) -> Self {
        let spe = state.steps_per_epoch.max(1);
        let next = state.local_step + 1;
        Self {
            resume_step: next % spe,
            resume_epoch: state.epoch + next / spe,
        }
    }

    /// Set the resume counters on `state`
    pub fn apply_to(&self, state: &mut RunState) {
        state.resume_step = self.resume_step;
        state.resume_epoch = self.resume_epoch;
    }
}
