//! # ajustar
//!
//! Keras-style `compile` / `fit` / `predict` orchestration for
//! gradient-based training.
//!
//! The tensor engine is external: models implement [`engine::Module`],
//! losses implement [`engine::Differentiable`], optimizers and schedulers
//! implement the traits in [`optim`]. ajustar supplies everything around
//! them:
//!
//! - [`train::Trainer`] - run loop with gradient accumulation, resume and
//!   fault diagnostics
//! - [`train::StepEngine`] - mixed-precision loss scaling, clipping and
//!   scheduler lockstep
//! - [`train::callback`] - smoothing, progress bar, history, early stopping
//! - [`backend`] - plain, data-parallel, distributed and external-engine
//!   execution
//! - [`checkpoint`] - weights, optimizer, scheduler and resume artifacts
//! - [`config`] - typed YAML/JSON trainer configuration

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod optim;
pub mod precision;
pub mod train;

pub use error::{Error, Result};

/// Install the `env_logger` subscriber (`RUST_LOG` controls the level).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
