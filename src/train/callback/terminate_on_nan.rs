//! Stop on non-finite loss

use super::traits::{Callback, CallbackAction};
use crate::train::{LogRecord, RunState};
use crate::Result;
use log::error;

/// Requests a stop as soon as the step loss is NaN or infinite
#[derive(Clone, Debug)]
pub struct TerminateOnNaN {
    key: String,
}

impl Default for TerminateOnNaN {
    fn default() -> Self {
        Self { key: "loss".to_string() }
    }
}

impl TerminateOnNaN {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch another log key
    pub fn watching(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Callback for TerminateOnNaN {
    fn on_batch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        match logs.get(&self.key) {
            Some(v) if !v.is_finite() => {
                error!("{} is {v} at global step {}, terminating", self.key, state.global_step);
                Ok(CallbackAction::Stop)
            }
            _ => Ok(CallbackAction::Continue),
        }
    }

    fn name(&self) -> &'static str {
        "TerminateOnNaN"
    }
}
