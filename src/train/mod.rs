//! High-level training loop
//!
//! This module provides the Keras-style training layer:
//! - `Trainer` - `compile` / `fit` / `predict` over a backend-owned module
//! - `StepEngine` - backward, unscale, clip, update, scheduler lockstep
//! - Loss normalization (scalar, named mapping, sequence)
//! - Metrics registry and per-step `LogRecord`
//! - Callbacks (smoothing, progress bar, history, early stopping, checkpoints)
//! - `TrainableAdapter` - a trainer usable as a `Module`
//!
//! # Example
//!
//! ```no_run
//! use ajustar::config::TrainerConfig;
//! use ajustar::precision::Precision;
//! use ajustar::train::{LossOutput, Trainer};
//! use ajustar::optim::{SGD, StepDecayLR};
//! # use ajustar::engine::{Module, Parameter};
//! # struct Net;
//! # impl Module for Net {
//! #     type Input = f32;
//! #     type Output = f32;
//! #     fn forward(&mut self, x: &f32) -> ajustar::Result<f32> { Ok(*x) }
//! #     fn parameters(&self) -> Vec<&dyn Parameter> { vec![] }
//! #     fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter> { vec![] }
//! #     fn set_training(&mut self, _training: bool) {}
//! #     fn is_training(&self) -> bool { true }
//! # }
//!
//! let config = TrainerConfig::default()
//!     .with_precision(Precision::Fp16)
//!     .with_grad_accumulation(4);
//! let mut trainer: Trainer<Net, f32> = Trainer::new(Net).with_config(config)?;
//! trainer.compile(
//!     |out: &f32, y: &f32| Ok(LossOutput::scalar((out - y).abs())),
//!     Some(Box::new(SGD::new(0.1, 0.9))),
//!     vec![Box::new(StepDecayLR::new(0.1, 100, 0.5))],
//!     Vec::new(),
//! )?;
//! # Ok::<(), ajustar::Error>(())
//! ```

mod adapter;
pub mod callback;
mod logs;
mod loss;
mod metrics;
mod state;
mod step;
mod trainer;

pub use adapter::TrainableAdapter;
pub use callback::{
    Callback, CallbackAction, CallbackList, CheckpointCallback, EarlyStopping, History,
    MonitorMode, ProgressBar, SmoothMetrics, TerminateOnNaN, TrainParams,
};
pub use logs::LogRecord;
pub use loss::{Criterion, LossOutput, LossTerm, NormalizedLoss};
pub use metrics::{Accuracy, Metric, MetricFn, MetricSpec, Metrics, MultiMetricFn, MAE};
pub use state::RunState;
pub use step::{StepEngine, StepOutcome};
pub use trainer::{
    BatchEncoder, FaultDiagnostics, FaultNotifier, LogNotifier, ParameterSummary, Trainer,
};
