//! Checkpoint callback requesting periodic saves

use super::traits::{Callback, CallbackAction};
use super::early_stopping::MonitorMode;
use crate::train::{LogRecord, RunState};
use crate::Result;
use std::path::PathBuf;

/// When a [`CheckpointCallback`] fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveTrigger {
    /// Every `n` global steps
    Steps(usize),
    /// Every `n` epochs
    Epochs(usize),
}

/// Asks the run loop to save a full checkpoint periodically, and optionally
/// whenever the monitored epoch metric improves.
///
/// The directory template may contain `{epoch}` and `{step}`; the run loop
/// performs the save after the current hook returns.
#[derive(Clone, Debug)]
pub struct CheckpointCallback {
    template: String,
    trigger: SaveTrigger,
    best: Option<(String, MonitorMode, PathBuf)>,
    best_value: Option<f32>,
    pub(crate) last_saved: Option<PathBuf>,
}

impl CheckpointCallback {
    /// Save once per epoch into `template`
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            trigger: SaveTrigger::Epochs(1),
            best: None,
            best_value: None,
            last_saved: None,
        }
    }

    pub fn save_every_steps(mut self, steps: usize) -> Self {
        self.trigger = SaveTrigger::Steps(steps.max(1));
        self
    }

    pub fn save_every_epochs(mut self, epochs: usize) -> Self {
        self.trigger = SaveTrigger::Epochs(epochs.max(1));
        self
    }

    /// Also save into `dir` whenever `key` improves at epoch end
    pub fn save_best(mut self, key: impl Into<String>, mode: MonitorMode, dir: impl Into<PathBuf>) -> Self {
        self.best = Some((key.into(), mode, dir.into()));
        self
    }

    /// Directory for the given counters
    pub fn checkpoint_dir(&self, epoch: usize, global_step: usize) -> PathBuf {
        PathBuf::from(
            self.template
                .replace("{epoch}", &(epoch + 1).to_string())
                .replace("{step}", &(global_step + 1).to_string()),
        )
    }

    fn request(&mut self, mut dirs: Vec<PathBuf>) -> CallbackAction {
        if let Some(last) = dirs.last() {
            self.last_saved = Some(last.clone());
        }
        match dirs.len() {
            0 => CallbackAction::Continue,
            1 => CallbackAction::Checkpoint(dirs.remove(0)),
            _ => CallbackAction::Checkpoints(dirs),
        }
    }
}

impl Callback for CheckpointCallback {
    fn on_batch_end(&mut self, state: &RunState, _logs: &mut LogRecord) -> Result<CallbackAction> {
        match self.trigger {
            SaveTrigger::Steps(n) if (state.global_step + 1) % n == 0 => {
                let dir = self.checkpoint_dir(state.epoch, state.global_step);
                Ok(self.request(vec![dir]))
            }
            _ => Ok(CallbackAction::Continue),
        }
    }

    fn on_epoch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        let mut dirs = Vec::new();
        if let SaveTrigger::Epochs(n) = self.trigger {
            if (state.epoch + 1) % n == 0 {
                dirs.push(self.checkpoint_dir(state.epoch, state.global_step));
            }
        }
        if let Some((key, mode, dir)) = &self.best {
            if let Some(value) = logs.get(key) {
                let improved = match (self.best_value, mode) {
                    (None, _) => true,
                    (Some(best), MonitorMode::Min) => value < best,
                    (Some(best), MonitorMode::Max) => value > best,
                };
                if improved {
                    self.best_value = Some(value);
                    dirs.push(dir.clone());
                }
            }
        }
        Ok(self.request(dirs))
    }

    fn interval(&self) -> Option<usize> {
        match self.trigger {
            SaveTrigger::Steps(n) => Some(n),
            SaveTrigger::Epochs(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        "CheckpointCallback"
    }
}
