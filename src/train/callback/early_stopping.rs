//! Early stopping callback to halt training when a metric plateaus

use super::traits::{Callback, CallbackAction};
use crate::train::{LogRecord, RunState};
use crate::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Direction of improvement for a monitored metric
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

/// Stops training when the monitored epoch metric has not improved by more
/// than `min_delta` for `patience` epochs.
///
/// # Example
///
/// ```rust
/// use ajustar::train::callback::EarlyStopping;
///
/// // Stop if loss has not improved by 0.001 for 5 epochs
/// let early_stop = EarlyStopping::new(5, 0.001);
/// ```
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    monitor: String,
    mode: MonitorMode,
    patience: usize,
    min_delta: f32,
    best: Option<f32>,
    pub(crate) epochs_without_improvement: usize,
}

impl EarlyStopping {
    /// Monitor `loss` (lower is better)
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            monitor: "loss".to_string(),
            mode: MonitorMode::Min,
            patience,
            min_delta,
            best: None,
            epochs_without_improvement: 0,
        }
    }

    /// Monitor another log key
    pub fn monitor(mut self, key: impl Into<String>, mode: MonitorMode) -> Self {
        self.monitor = key.into();
        self.mode = mode;
        self
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }

    pub fn reset(&mut self) {
        self.best = None;
        self.epochs_without_improvement = 0;
    }

    fn improved(&self, value: f32) -> bool {
        match (self.best, self.mode) {
            (None, _) => true,
            (Some(best), MonitorMode::Min) => value < best - self.min_delta,
            (Some(best), MonitorMode::Max) => value > best + self.min_delta,
        }
    }
}

impl Callback for EarlyStopping {
    fn on_train_begin(&mut self, _state: &RunState) -> Result<CallbackAction> {
        self.reset();
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        let Some(value) = logs.get(&self.monitor) else {
            warn!("EarlyStopping: '{}' not in logs, skipping epoch {}", self.monitor, state.epoch);
            return Ok(CallbackAction::Continue);
        };

        if self.improved(value) {
            self.best = Some(value);
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
        }

        if self.epochs_without_improvement >= self.patience {
            info!(
                "Early stopping: no improvement in '{}' for {} epochs (best: {:.4})",
                self.monitor,
                self.epochs_without_improvement,
                self.best.unwrap_or(value)
            );
            Ok(CallbackAction::Stop)
        } else {
            Ok(CallbackAction::Continue)
        }
    }

    fn name(&self) -> &'static str {
        "EarlyStopping"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch_end(es: &mut EarlyStopping, key: &str, value: f32) -> CallbackAction {
        let mut logs = LogRecord::new();
        logs.insert(key, value);
        es.on_epoch_end(&RunState::default(), &mut logs).unwrap()
    }

    #[test]
    fn test_early_stopping_patience() {
        let mut es = EarlyStopping::new(3, 0.001);
        assert_eq!(epoch_end(&mut es, "loss", 1.0), CallbackAction::Continue);
        assert_eq!(epoch_end(&mut es, "loss", 0.9), CallbackAction::Continue);
        // within delta
        assert_eq!(epoch_end(&mut es, "loss", 0.8995), CallbackAction::Continue);
        assert_eq!(epoch_end(&mut es, "loss", 0.8995), CallbackAction::Continue);
        assert_eq!(epoch_end(&mut es, "loss", 0.8995), CallbackAction::Stop);
        assert_eq!(es.best(), Some(0.9));
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut es = EarlyStopping::new(2, 0.01);
        epoch_end(&mut es, "loss", 1.0);
        epoch_end(&mut es, "loss", 1.0);
        assert_eq!(es.epochs_without_improvement, 1);
        epoch_end(&mut es, "loss", 0.5);
        assert_eq!(es.epochs_without_improvement, 0);
    }

    #[test]
    fn test_max_mode_on_custom_key() {
        let mut es = EarlyStopping::new(1, 0.0).monitor("acc", MonitorMode::Max);
        assert_eq!(epoch_end(&mut es, "acc", 0.5), CallbackAction::Continue);
        assert_eq!(epoch_end(&mut es, "acc", 0.6), CallbackAction::Continue);
        assert_eq!(epoch_end(&mut es, "acc", 0.6), CallbackAction::Stop);
    }

    #[test]
    fn test_missing_key_is_ignored() {
        let mut es = EarlyStopping::new(0, 0.0).monitor("val_loss", MonitorMode::Min);
        assert_eq!(epoch_end(&mut es, "loss", 1.0), CallbackAction::Continue);
    }

    #[test]
    fn test_train_begin_resets() {
        let mut es = EarlyStopping::new(5, 0.0);
        epoch_end(&mut es, "loss", 1.0);
        es.on_train_begin(&RunState::default()).unwrap();
        assert_eq!(es.best(), None);
    }
}
