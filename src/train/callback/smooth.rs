//! Windowed metric smoothing

use super::traits::{Callback, CallbackAction, CallbackRole};
use crate::config::SmoothingConfig;
use crate::train::{LogRecord, RunState};
use crate::Result;

/// Replaces step metrics with their running mean over the current window.
///
/// The window resets every `interval` global steps and at each epoch
/// begin. Keys listed as stateful pass through raw.
#[derive(Debug, Clone)]
pub struct SmoothMetrics {
    interval: usize,
    stateful_metrics: Vec<String>,
    sums: Vec<(String, f64, usize)>,
}

impl SmoothMetrics {
    pub fn new(interval: usize) -> Self {
        Self::from_config(&SmoothingConfig { interval, ..Default::default() })
    }

    pub fn from_config(config: &SmoothingConfig) -> Self {
        Self {
            interval: config.interval.max(1),
            stateful_metrics: config.stateful_metrics.clone(),
            sums: Vec::new(),
        }
    }

    /// Mark `key` as stateful
    pub fn with_stateful(mut self, key: impl Into<String>) -> Self {
        self.stateful_metrics.push(key.into());
        self
    }

    fn reset(&mut self) {
        self.sums.clear();
    }
}

impl Callback for SmoothMetrics {
    fn on_epoch_begin(&mut self, _state: &RunState) -> Result<CallbackAction> {
        self.reset();
        Ok(CallbackAction::Continue)
    }

    fn on_batch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        for (key, value) in logs.iter_mut() {
            if self.stateful_metrics.iter().any(|s| s == key) {
                continue;
            }
            let slot = match self.sums.iter().position(|(k, _, _)| k == key) {
                Some(i) => i,
                None => {
                    self.sums.push((key.to_string(), 0.0, 0));
                    self.sums.len() - 1
                }
            };
            let (_, sum, count) = &mut self.sums[slot];
            *sum += f64::from(*value);
            *count += 1;
            *value = (*sum / *count as f64) as f32;
        }
        if (state.global_step + 1) % self.interval == 0 {
            self.reset();
        }
        Ok(CallbackAction::Continue)
    }

    fn role(&self) -> CallbackRole {
        CallbackRole::Smoothing
    }

    fn interval(&self) -> Option<usize> {
        Some(self.interval)
    }

    fn name(&self) -> &'static str {
        "SmoothMetrics"
    }
}
