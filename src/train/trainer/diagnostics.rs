//! Best-effort diagnostics when `fit` fails.
//!
//! Each action runs independently and only logs its own failure, so the
//! original training error always reaches the caller unchanged.

use super::core::Trainer;
use crate::checkpoint::CheckpointRequest;
use crate::config::FaultConfig;
use crate::engine::Module;
use crate::{Error, Result};
use log::{error, info};
use serde_json::{json, Value};
use std::path::PathBuf;

/// External notification hook for training failures
pub trait FaultNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Notifier writing the failure report through `log`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl FaultNotifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        error!("{subject}\n{body}");
        Ok(())
    }
}

/// Converts a batch into JSON for offline inspection
pub type BatchEncoder<X, Y> = Box<dyn Fn(&X, &Y) -> Result<Value>>;

/// What to do when a training step fails
pub struct FaultDiagnostics<X, Y> {
    /// Full checkpoint written here
    pub checkpoint_dir: Option<PathBuf>,
    /// Last batch dumped here, when an encoder is set
    pub batch_path: Option<PathBuf>,
    pub subject: String,
    batch_encoder: Option<BatchEncoder<X, Y>>,
    notifier: Option<Box<dyn FaultNotifier>>,
}

impl<X, Y> Default for FaultDiagnostics<X, Y> {
    fn default() -> Self {
        Self {
            checkpoint_dir: None,
            batch_path: None,
            subject: "training failed".to_string(),
            batch_encoder: None,
            notifier: None,
        }
    }
}

impl<X, Y> FaultDiagnostics<X, Y> {
    pub fn from_config(config: &FaultConfig) -> Self {
        let mut diagnostics = Self::default();
        diagnostics.apply_config(config);
        diagnostics
    }

    /// Take paths and notification settings from `config`, keeping any
    /// encoder or custom notifier already set
    pub fn apply_config(&mut self, config: &FaultConfig) {
        self.checkpoint_dir = config.checkpoint_dir.clone();
        self.batch_path = config.batch_path.clone();
        if let Some(subject) = &config.subject {
            self.subject = subject.clone();
        }
        if config.notify && self.notifier.is_none() {
            self.notifier = Some(Box::new(LogNotifier));
        } else if !config.notify {
            self.notifier = None;
        }
    }

    pub fn with_batch_encoder(mut self, encoder: impl Fn(&X, &Y) -> Result<Value> + 'static) -> Self {
        self.batch_encoder = Some(Box::new(encoder));
        self
    }

    pub fn set_batch_encoder(&mut self, encoder: impl Fn(&X, &Y) -> Result<Value> + 'static) {
        self.batch_encoder = Some(Box::new(encoder));
    }

    pub fn set_notifier(&mut self, notifier: impl FaultNotifier + 'static) {
        self.notifier = Some(Box::new(notifier));
    }

    pub fn is_active(&self) -> bool {
        self.checkpoint_dir.is_some() || self.batch_path.is_some() || self.notifier.is_some()
    }
}

impl<M: Module, Y> Trainer<M, Y> {
    /// Run every configured diagnostic action for `err`
    pub(crate) fn run_diagnostics(&mut self, err: &Error) {
        if !self.diagnostics.is_active() {
            return;
        }
        let step = self.state.global_step;

        if let Some(dir) = self.diagnostics.checkpoint_dir.clone() {
            let request = CheckpointRequest::dir(&dir);
            match self.backend.save_checkpoint(self.engine.as_ref(), &self.state, &request) {
                Ok(_) => info!("fault checkpoint written to {}", dir.display()),
                Err(e) => error!("fault checkpoint to {} failed: {e}", dir.display()),
            }
        }

        if let Some(path) = self.diagnostics.batch_path.clone() {
            match self.dump_last_batch(&path) {
                Ok(true) => info!("last batch written to {}", path.display()),
                Ok(false) => info!("no batch encoder or no batch, {} not written", path.display()),
                Err(e) => error!("writing last batch to {} failed: {e}", path.display()),
            }
        }

        if let Some(notifier) = &self.diagnostics.notifier {
            let body = format!(
                "error: {err}\nepoch: {}\nglobal_step: {step}\nlocal_step: {}",
                self.state.epoch, self.state.local_step
            );
            if let Err(e) = notifier.notify(&self.diagnostics.subject, &body) {
                error!("fault notification failed: {e}");
            }
        }
    }

    fn dump_last_batch(&self, path: &std::path::Path) -> Result<bool> {
        let (Some(encoder), Some((x, y))) = (&self.diagnostics.batch_encoder, &self.last_batch) else {
            return Ok(false);
        };
        let record = json!({
            "global_step": self.state.global_step,
            "epoch": self.state.epoch,
            "batch": encoder(x, y)?,
        });
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
        Ok(true)
    }
}
