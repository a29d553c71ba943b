//! Progress rendering callback
//!
//! Keras-style single-line bar with a Kalman-filtered ETA, or one log line
//! every `interval` steps.

use super::traits::{Callback, CallbackAction, CallbackRole, TrainParams};
use crate::config::{ProgbarKind, ProgressConfig};
use crate::train::{LogRecord, RunState};
use crate::Result;
use log::info;
use std::io::Write;
use std::time::Instant;

/// Kalman filter over per-step duration
#[derive(Debug, Clone)]
pub struct KalmanEta {
    estimate: f64,
    error_cov: f64,
    process_noise: f64,
    measurement_noise: f64,
}

impl Default for KalmanEta {
    fn default() -> Self {
        Self { estimate: 1.0, error_cov: 1.0, process_noise: 0.01, measurement_noise: 0.1 }
    }
}

impl KalmanEta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one measured step duration (seconds)
    pub fn update(&mut self, measured: f64) {
        let predicted_error = self.error_cov + self.process_noise;
        let gain = predicted_error / (predicted_error + self.measurement_noise);
        self.estimate += gain * (measured - self.estimate);
        self.error_cov = (1.0 - gain) * predicted_error;
    }

    pub fn eta_seconds(&self, remaining_steps: usize) -> f64 {
        self.estimate * remaining_steps as f64
    }
}

/// Format seconds as `42s`, `3m 07s` or `2h 05m`
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.0}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let s = (secs % 60.0).floor();
        format!("{mins}m {s:02.0}s")
    } else {
        let hours = (secs / 3600.0).floor();
        let mins = ((secs % 3600.0) / 60.0).floor();
        format!("{hours}h {mins:02.0}m")
    }
}

fn format_value(value: f32) -> String {
    if value != 0.0 && value.abs() < 1e-3 {
        format!("{value:.4e}")
    } else {
        format!("{value:.4}")
    }
}

/// Progress callback writing to stderr
#[derive(Debug, Clone)]
pub struct ProgressBar {
    config: ProgressConfig,
    epochs: usize,
    steps_per_epoch: usize,
    /// Columns in display order
    columns: Vec<String>,
    eta: KalmanEta,
    last_tick: Option<Instant>,
    epoch_start: Option<Instant>,
    seen: usize,
}

impl ProgressBar {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            epochs: 0,
            steps_per_epoch: 0,
            columns: Vec::new(),
            eta: KalmanEta::new(),
            last_tick: None,
            epoch_start: None,
            seen: 0,
        }
    }

    /// Displayed column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn format_columns(&self, logs: &LogRecord) -> String {
        self.columns
            .iter()
            .filter_map(|name| logs.get(name).map(|v| format!(" - {name}: {}", format_value(v))))
            .collect()
    }

    /// Render the bar line for `seen` completed steps of the epoch
    pub fn render_bar(&self, seen: usize, logs: &LogRecord) -> String {
        let total = self.steps_per_epoch.max(1);
        let width = self.config.width;
        let filled = ((seen.min(total) * width) as f64 / total as f64).round() as usize;
        let mut bar = "=".repeat(filled.saturating_sub(1));
        if filled > 0 {
            bar.push(if seen >= total { '=' } else { '>' });
        }
        bar.push_str(&".".repeat(width.saturating_sub(filled)));

        let digits = total.to_string().len();
        let remaining = total.saturating_sub(seen);
        let timing = if remaining > 0 {
            format!("ETA: {}", format_duration(self.eta.eta_seconds(remaining)))
        } else {
            let elapsed = self.epoch_start.map_or(0.0, |t| t.elapsed().as_secs_f64());
            format_duration(elapsed)
        };
        format!("{seen:>digits$}/{total} [{bar}] - {timing}{}", self.format_columns(logs))
    }

    fn tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            self.eta.update(now.duration_since(last).as_secs_f64());
        }
        self.last_tick = Some(now);
    }
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new(ProgressConfig::default())
    }
}

impl Callback for ProgressBar {
    fn set_params(&mut self, params: &TrainParams) {
        self.epochs = params.epochs;
        self.steps_per_epoch = params.steps_per_epoch;
        self.columns = params.metrics.clone();
        if !self.columns.iter().any(|c| c == "lr") {
            self.columns.push("lr".to_string());
        }
    }

    fn add_metrics(&mut self, names: &[String], position: Option<usize>) {
        let fresh: Vec<String> =
            names.iter().filter(|n| !self.columns.contains(n)).cloned().collect();
        let at = position.unwrap_or(self.columns.len()).min(self.columns.len());
        self.columns.splice(at..at, fresh);
    }

    fn on_epoch_begin(&mut self, state: &RunState) -> Result<CallbackAction> {
        self.seen = state.start_step(state.epoch);
        self.epoch_start = Some(Instant::now());
        self.last_tick = None;
        if self.config.kind == ProgbarKind::Keras {
            eprintln!("Epoch {}/{}", state.epoch + 1, self.epochs);
        }
        Ok(CallbackAction::Continue)
    }

    fn on_batch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        self.seen = state.local_step + 1;
        self.tick();
        match self.config.kind {
            ProgbarKind::Keras => {
                let mut stderr = std::io::stderr().lock();
                write!(stderr, "\r{}", self.render_bar(self.seen, logs))?;
                stderr.flush()?;
            }
            ProgbarKind::Log => {
                if (state.global_step + 1) % self.config.interval.max(1) == 0 {
                    info!(
                        "Epoch {}/{} step {}/{}{}",
                        state.epoch + 1,
                        self.epochs,
                        self.seen,
                        self.steps_per_epoch,
                        self.format_columns(logs)
                    );
                }
            }
        }
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, _state: &RunState, _logs: &mut LogRecord) -> Result<CallbackAction> {
        if self.config.kind == ProgbarKind::Keras {
            eprintln!();
        }
        Ok(CallbackAction::Continue)
    }

    fn role(&self) -> CallbackRole {
        CallbackRole::Progress
    }

    fn interval(&self) -> Option<usize> {
        match self.config.kind {
            ProgbarKind::Log => Some(self.config.interval),
            ProgbarKind::Keras => None,
        }
    }

    fn name(&self) -> &'static str {
        "ProgressBar"
    }
}
