//! Run history, always dispatched last

use super::traits::{Callback, CallbackAction, TrainParams};
use crate::train::{LogRecord, RunState};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Logs of one completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub global_step: usize,
    pub epoch: usize,
    pub local_step: usize,
    pub logs: LogRecord,
}

/// Logs seen at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub global_step: usize,
    pub logs: LogRecord,
}

/// Step and epoch logs of a `fit` call, as observed after every other
/// callback has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    params: Option<HistoryParams>,
    steps: Vec<StepRecord>,
    epochs: Vec<EpochRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HistoryParams {
    epochs: usize,
    steps_per_epoch: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn epochs(&self) -> &[EpochRecord] {
        &self.epochs
    }

    /// Per-step values of `key`, skipping steps that lack it
    pub fn series(&self, key: &str) -> Vec<f32> {
        self.steps.iter().filter_map(|r| r.logs.get(key)).collect()
    }

    /// Per-epoch values of `key`
    pub fn epoch_series(&self, key: &str) -> Vec<f32> {
        self.epochs.iter().filter_map(|r| r.logs.get(key)).collect()
    }

    /// Global step of the last recorded step
    pub fn last_global_step(&self) -> Option<usize> {
        self.steps.last().map(|r| r.global_step)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

impl Callback for History {
    fn set_params(&mut self, params: &TrainParams) {
        self.params =
            Some(HistoryParams { epochs: params.epochs, steps_per_epoch: params.steps_per_epoch });
    }

    fn on_batch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        self.steps.push(StepRecord {
            global_step: state.global_step,
            epoch: state.epoch,
            local_step: state.local_step,
            logs: logs.clone(),
        });
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        self.epochs.push(EpochRecord {
            epoch: state.epoch,
            global_step: state.global_step,
            logs: logs.clone(),
        });
        Ok(CallbackAction::Continue)
    }

    fn name(&self) -> &'static str {
        "History"
    }
}
