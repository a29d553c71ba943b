//! Execution backends
//!
//! A backend owns the trainable module and decides how forward, backward,
//! the parameter update and checkpoint I/O are carried out:
//!
//! - [`Plain`] - single process, direct calls
//! - [`DataParallel`] - forward through a replicate/scatter/gather collaborator
//! - [`Distributed`] - one process per rank, gradients averaged before each update
//! - [`ExternalEngine`] - backward (and optionally step and checkpoints)
//!   delegated to a third-party training engine
//!
//! The run loop only talks to [`Backend`], so every variant produces the
//! same step and callback sequence.

mod context;
mod data_parallel;
mod distributed;
pub mod external;
mod plain;

pub use context::ProcessContext;
pub use data_parallel::{DataParallel, ParallelForward};
pub use distributed::{Distributed, GradientSync, NoOpSync};
pub use external::{EngineCheckpointArgs, ExternalEngine, TrainingEngine};
pub use plain::Plain;

use crate::checkpoint::{self, CheckpointRequest};
use crate::config::TrainerConfig;
use crate::data::{DataSource, Sampler};
use crate::engine::{Differentiable, Module};
use crate::train::{RunState, StepEngine, StepOutcome};
use crate::Result;
use std::path::PathBuf;

/// Type-erased view of a data source for backend preparation
pub trait DataHandle {
    fn batch_size(&self) -> Option<usize>;
    fn has_sampler(&mut self) -> bool;
    /// Returns false when the source cannot take a sampler
    fn attach_sampler(&mut self, sampler: Box<dyn Sampler>) -> bool;
}

impl<D: DataSource> DataHandle for D {
    fn batch_size(&self) -> Option<usize> {
        DataSource::batch_size(self)
    }

    fn has_sampler(&mut self) -> bool {
        self.sampler_mut().is_some()
    }

    fn attach_sampler(&mut self, sampler: Box<dyn Sampler>) -> bool {
        DataSource::attach_sampler(self, sampler)
    }
}

/// Strategy the run loop drives for one training step.
///
/// Defaults implement the single-process path; variants override the
/// pieces they change.
pub trait Backend<M: Module> {
    fn name(&self) -> &'static str;

    /// The raw module, for parameter access, mode switching and state dicts
    fn unwrap_model(&self) -> &M;

    fn unwrap_model_mut(&mut self) -> &mut M;

    fn forward(&mut self, input: &M::Input) -> Result<M::Output> {
        self.unwrap_model_mut().forward(input)
    }

    /// Adjust the data source before the first batch is fetched
    fn prepare_data(&mut self, _data: &mut dyn DataHandle) -> Result<()> {
        Ok(())
    }

    /// Reconcile backend settings with the trainer's at the start of a
    /// run, once the step counts and the data batch size are known
    fn configure_run(&mut self, _config: &TrainerConfig, _state: &RunState, _batch_size: Option<usize>) -> Result<()> {
        Ok(())
    }

    fn loss_backward(&mut self, engine: &mut StepEngine, loss: &dyn Differentiable) -> Result<()> {
        let mut params = self.unwrap_model_mut().parameters_mut();
        engine.backward(&mut params, loss)
    }

    fn step(&mut self, engine: &mut StepEngine) -> Result<StepOutcome> {
        let mut params = self.unwrap_model_mut().parameters_mut();
        engine.step(&mut params)
    }

    fn learning_rate(&self, engine: &StepEngine) -> Option<f32> {
        engine.learning_rate()
    }

    /// False when the backend manages its own optimizer and a user one
    /// must be dropped
    fn accepts_optimizer(&self) -> bool {
        true
    }

    fn save_checkpoint(
        &mut self,
        engine: Option<&StepEngine>,
        state: &RunState,
        request: &CheckpointRequest,
    ) -> Result<Vec<PathBuf>> {
        checkpoint::save_checkpoint(self.unwrap_model(), engine, state, request)
    }

    fn resume_checkpoint(
        &mut self,
        engine: Option<&mut StepEngine>,
        state: &mut RunState,
        request: &CheckpointRequest,
    ) -> Result<()> {
        checkpoint::resume_checkpoint(self.unwrap_model_mut(), engine, state, request)
    }

    /// Whether this process prints and runs callbacks
    fn is_primary(&self) -> bool {
        true
    }
}
