//! Ordered callback dispatch

use super::history::History;
use super::smooth::SmoothMetrics;
use super::traits::{Callback, CallbackAction, CallbackRole, TrainParams};
use crate::config::SmoothingConfig;
use crate::train::{LogRecord, RunState};
use crate::Result;
use log::warn;
use std::path::PathBuf;

/// Combined effect of one event across every callback
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Some callback asked to stop
    pub stop: bool,
    /// Checkpoint directories requested, in dispatch order
    pub checkpoints: Vec<PathBuf>,
}

impl Dispatch {
    fn absorb(&mut self, action: CallbackAction) {
        match action {
            CallbackAction::Continue => {}
            CallbackAction::Stop => self.stop = true,
            CallbackAction::Checkpoint(dir) => self.checkpoints.push(dir),
            CallbackAction::Checkpoints(dirs) => self.checkpoints.extend(dirs),
        }
    }
}

/// Callbacks in dispatch order, with [`History`] always last.
///
/// Dispatch can be switched off as a whole (non-primary ranks) without
/// dropping the registered callbacks.
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
    history: History,
    enabled: bool,
}

impl CallbackList {
    /// Keep `callbacks` in the given order and append a fresh history
    pub fn new(callbacks: Vec<Box<dyn Callback>>) -> Self {
        Self { callbacks, history: History::new(), enabled: true }
    }

    /// Order callbacks for a run: smoothing first (user-supplied, else
    /// built from `smoothing`), then `progress`, then the remaining user
    /// callbacks in registration order, then history.
    pub fn assemble(
        user: Vec<Box<dyn Callback>>,
        smoothing: Option<&SmoothingConfig>,
        progress: Option<Box<dyn Callback>>,
    ) -> Self {
        let (mut ordered, rest): (Vec<_>, Vec<_>) =
            user.into_iter().partition(|cb| cb.role() == CallbackRole::Smoothing);

        if ordered.is_empty() {
            if let Some(config) = smoothing {
                ordered.push(Box::new(SmoothMetrics::from_config(config)));
            }
        } else if smoothing.is_some() {
            warn!("user-supplied smoothing callback in use, smoothing config ignored");
        }

        if let Some(interval) = ordered.first().and_then(|s| s.interval()) {
            for cb in &rest {
                if let Some(own) = cb.interval() {
                    if own % interval != 0 {
                        warn!(
                            "{}.interval={own} is not a multiple of smoothing interval={interval}",
                            cb.name()
                        );
                    }
                }
            }
        }

        ordered.extend(progress);
        ordered.extend(rest);
        Self::new(ordered)
    }

    /// Enable or disable all dispatch
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Callback count, history included
    pub fn len(&self) -> usize {
        self.callbacks.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Callback names in dispatch order
    pub fn names(&self) -> Vec<&'static str> {
        self.callbacks.iter().map(|cb| cb.name()).chain([self.history.name()]).collect()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn into_history(self) -> History {
        self.history
    }

    fn dispatch(
        &mut self,
        mut hook: impl FnMut(&mut dyn Callback) -> Result<CallbackAction>,
    ) -> Result<Dispatch> {
        let mut outcome = Dispatch::default();
        if !self.enabled {
            return Ok(outcome);
        }
        for cb in &mut self.callbacks {
            outcome.absorb(hook(cb.as_mut())?);
        }
        outcome.absorb(hook(&mut self.history)?);
        Ok(outcome)
    }

    fn notify(&mut self, mut hook: impl FnMut(&mut dyn Callback) -> Result<()>) -> Result<()> {
        self.dispatch(|cb| hook(cb).map(|()| CallbackAction::Continue)).map(|_| ())
    }

    pub fn set_params(&mut self, params: &TrainParams) {
        for cb in &mut self.callbacks {
            cb.set_params(params);
        }
        self.history.set_params(params);
    }

    pub fn add_metrics(&mut self, names: &[String], position: Option<usize>) {
        if !self.enabled || names.is_empty() {
            return;
        }
        for cb in &mut self.callbacks {
            cb.add_metrics(names, position);
        }
    }

    pub fn on_train_begin(&mut self, state: &RunState) -> Result<Dispatch> {
        self.dispatch(|cb| cb.on_train_begin(state))
    }

    pub fn on_train_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<()> {
        self.notify(|cb| cb.on_train_end(state, logs))
    }

    pub fn on_epoch_begin(&mut self, state: &RunState) -> Result<Dispatch> {
        self.dispatch(|cb| cb.on_epoch_begin(state))
    }

    pub fn on_epoch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<Dispatch> {
        self.dispatch(|cb| cb.on_epoch_end(state, logs))
    }

    pub fn on_batch_begin(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<Dispatch> {
        self.dispatch(|cb| cb.on_batch_begin(state, logs))
    }

    pub fn on_batch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<Dispatch> {
        self.dispatch(|cb| cb.on_batch_end(state, logs))
    }

    pub fn on_train_step_end(&mut self, state: &RunState) -> Result<()> {
        self.notify(|cb| cb.on_train_step_end(state))
    }

    pub fn on_dataloader_end(&mut self, state: &RunState) -> Result<()> {
        self.notify(|cb| cb.on_dataloader_end(state))
    }
}
