//! Trainer abstraction for training loops
//!
//! This module provides a high-level `Trainer` that orchestrates the run:
//! - `compile` - criterion, optimizer, schedulers, metrics
//! - `fit` - epoch/step loop with gradient accumulation and callbacks
//! - `predict` / `forward` - inference through the backend
//! - Checkpoint and weight save/load
//! - Fault diagnostics when a run fails
//!
//! # Example
//!
//! ```no_run
//! use ajustar::data::VecDataSource;
//! use ajustar::optim::SGD;
//! use ajustar::train::{EarlyStopping, LossOutput, Trainer};
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
//! let mut trainer: Trainer<Net, f32> = Trainer::new(Net);
//! trainer.compile(
//!     |out: &f32, y: &f32| Ok(LossOutput::scalar((out - y).abs())),
//!     Some(Box::new(SGD::new(0.01, 0.9))),
//!     Vec::new(),
//!     Vec::new(),
//! )?;
//!
//! let mut data = VecDataSource::new(vec![(1.0, 2.0), (2.0, 4.0)]);
//! let history = trainer.fit(&mut data, None, 10, vec![Box::new(EarlyStopping::new(3, 1e-4))], true)?;
//! println!("final loss: {:?}", history.epoch_series("loss").last());
//! # Ok::<(), ajustar::Error>(())
//! ```

mod core;
mod diagnostics;
mod feed;
mod fit;
mod step;

pub use core::{ParameterSummary, Trainer};
pub use diagnostics::{BatchEncoder, FaultDiagnostics, FaultNotifier, LogNotifier};
