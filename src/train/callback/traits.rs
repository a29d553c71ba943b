//! Core traits and types for the callback system
//!
//! - `TrainParams` - run parameters handed to callbacks before training
//! - `CallbackAction` - what a callback asks the run loop to do
//! - `CallbackRole` - placement class used to order the callback list
//! - `Callback` - the trait all callbacks implement

use crate::train::{LogRecord, RunState};
use crate::Result;
use std::path::PathBuf;

/// Run parameters passed to [`Callback::set_params`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainParams {
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub total_steps: usize,
    pub verbose: bool,
    /// Keyed metric names, `loss` first
    pub metrics: Vec<String>,
    pub resume_step: usize,
}

/// Action requested by a callback
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Continue training normally
    Continue,
    /// Set `stop_training`; the loop ends at the next epoch boundary
    Stop,
    /// Save a full checkpoint into this directory
    Checkpoint(PathBuf),
    /// Save into each directory, in order
    Checkpoints(Vec<PathBuf>),
}

/// Where a callback is placed in the dispatch order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackRole {
    /// Metric smoother, dispatched before everything else
    Smoothing,
    /// Progress renderer, dispatched right after the smoother
    Progress,
    /// Everything else, in registration order
    User,
}

/// Trait for training callbacks
///
/// Every hook has a no-op default. Hooks receive the run counters read-only
/// and may append to or rewrite the step's [`LogRecord`]; they change the run
/// only through the returned [`CallbackAction`]. An `Err` aborts `fit`.
pub trait Callback: Send {
    /// Called once per `fit`, before `on_train_begin`
    fn set_params(&mut self, _params: &TrainParams) {}

    /// New metric columns found on the first step; `position` is an index
    /// into the current column list
    fn add_metrics(&mut self, _names: &[String], _position: Option<usize>) {}

    fn on_train_begin(&mut self, _state: &RunState) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _state: &RunState, _logs: &mut LogRecord) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _state: &RunState) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, _state: &RunState, _logs: &mut LogRecord) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_batch_begin(&mut self, _state: &RunState, _logs: &mut LogRecord) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    fn on_batch_end(&mut self, _state: &RunState, _logs: &mut LogRecord) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    /// After every micro-batch backward
    fn on_train_step_end(&mut self, _state: &RunState) -> Result<()> {
        Ok(())
    }

    /// The data iterator was exhausted and is about to be rebuilt
    fn on_dataloader_end(&mut self, _state: &RunState) -> Result<()> {
        Ok(())
    }

    fn role(&self) -> CallbackRole {
        CallbackRole::User
    }

    /// Step interval this callback acts on, if any
    fn interval(&self) -> Option<usize> {
        None
    }

    /// Get callback name for logging
    fn name(&self) -> &'static str {
        "Callback"
    }
}
