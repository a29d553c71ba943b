//! Core Trainer struct and basic methods

use super::diagnostics::FaultDiagnostics;
use crate::backend::{Backend, Plain};
use crate::checkpoint::{self, CheckpointRequest, KeyMapping, WeightPaths};
use crate::config::TrainerConfig;
use crate::engine::{LoadReport, Module};
use crate::optim::{LRScheduler, Optimizer};
use crate::train::loss::{Criterion, LossOutput};
use crate::train::metrics::{MetricSpec, Metrics};
use crate::train::{RunState, StepEngine};
use crate::{Error, Result};
use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

/// Parameter counts of the trained module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSummary {
    pub total: usize,
    pub trainable: usize,
}

impl ParameterSummary {
    pub fn trainable_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.trainable as f64 / self.total as f64
        }
    }
}

impl fmt::Display for ParameterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trainable params: {} || all params: {} || trainable%: {:.4}",
            self.trainable,
            self.total,
            self.trainable_percent()
        )
    }
}

/// Keras-style trainer: `compile`, then `fit`, then `predict`.
///
/// The trainer owns the module through a [`Backend`], which decides how
/// forward, backward and the update run (single process, data parallel,
/// distributed, external engine).
///
/// # Example
///
/// ```no_run
/// use ajustar::train::{LossOutput, Trainer};
/// use ajustar::optim::SGD;
/// # use ajustar::engine::{Module, Parameter};
/// # struct Net;
/// # impl Module for Net {
/// #     type Input = Vec<f32>;
/// #     type Output = f32;
/// #     fn forward(&mut self, _x: &Vec<f32>) -> ajustar::Result<f32> { Ok(0.0) }
/// #     fn parameters(&self) -> Vec<&dyn Parameter> { vec![] }
/// #     fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter> { vec![] }
/// #     fn set_training(&mut self, _training: bool) {}
/// #     fn is_training(&self) -> bool { true }
/// # }
///
/// let mut trainer: Trainer<Net, f32> = Trainer::new(Net);
/// trainer
///     .compile(
///         |out: &f32, y: &f32| Ok(LossOutput::scalar((out - y).powi(2))),
///         Some(Box::new(SGD::new(0.01, 0.9))),
///         Vec::new(),
///         Vec::new(),
///     )
///     .unwrap();
/// ```
pub struct Trainer<M: Module, Y> {
    pub(crate) backend: Box<dyn Backend<M>>,
    pub(crate) engine: Option<StepEngine>,
    pub(crate) criterion: Option<Criterion<M::Output, Y>>,
    pub(crate) metrics: Metrics<M::Output, Y>,
    pub(crate) config: TrainerConfig,
    pub(crate) state: RunState,
    pub(crate) diagnostics: FaultDiagnostics<M::Input, Y>,
    /// Most recently fetched batch, kept for fault diagnostics
    pub(crate) last_batch: Option<(M::Input, Y)>,
}

impl<M: Module + 'static, Y> Trainer<M, Y> {
    /// Single-process trainer owning `module`
    pub fn new(module: M) -> Self {
        Self::with_backend(Plain::new(module))
    }
}

impl<M: Module, Y> Trainer<M, Y> {
    /// Trainer driving `backend`
    pub fn with_backend(backend: impl Backend<M> + 'static) -> Self {
        let config = TrainerConfig::default();
        Self {
            backend: Box::new(backend),
            engine: None,
            criterion: None,
            metrics: Metrics::default(),
            diagnostics: FaultDiagnostics::from_config(&config.on_error),
            config,
            state: RunState::default(),
            last_batch: None,
        }
    }

    /// Replace the configuration; takes effect at the next `compile`
    pub fn with_config(mut self, config: TrainerConfig) -> Result<Self> {
        self.set_config(config)?;
        Ok(self)
    }

    pub fn set_config(&mut self, config: TrainerConfig) -> Result<()> {
        config.validate()?;
        self.diagnostics.apply_config(&config.on_error);
        self.config = config;
        Ok(())
    }

    /// Register the criterion, optimizer, schedulers and metrics.
    ///
    /// Builds the step engine from the current configuration. The
    /// optimizer may be `None` only for backends that own their own.
    pub fn compile(
        &mut self,
        criterion: impl Fn(&M::Output, &Y) -> Result<LossOutput> + 'static,
        optimizer: Option<Box<dyn Optimizer>>,
        schedulers: Vec<Box<dyn LRScheduler>>,
        metrics: Vec<MetricSpec<M::Output, Y>>,
    ) -> Result<()> {
        self.config.validate()?;
        let optimizer = match optimizer {
            Some(_) if !self.backend.accepts_optimizer() => {
                warn!("{} manages optimizer state itself, supplied optimizer dropped", self.backend.name());
                None
            }
            other => other,
        };
        self.metrics = Metrics::from_specs(metrics)?;
        self.criterion = Some(Box::new(criterion));
        self.engine = Some(StepEngine::new(optimizer, schedulers, &self.config));
        info!(
            "compiled: backend={} precision={} grad_accumulation_steps={}",
            self.backend.name(),
            self.config.precision,
            self.config.grad_accumulation_steps
        );
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.engine.is_some() && self.criterion.is_some()
    }

    /// Forward through the backend, without changing the module's mode
    pub fn forward(&mut self, input: &M::Input) -> Result<M::Output> {
        self.backend.forward(input)
    }

    /// Switch to evaluation mode and run forward
    pub fn predict(&mut self, input: &M::Input) -> Result<M::Output> {
        self.backend.unwrap_model_mut().set_training(false);
        self.backend.forward(input)
    }

    /// Total and trainable parameter counts
    pub fn parameter_summary(&self) -> ParameterSummary {
        let params = self.backend.unwrap_model().parameters();
        ParameterSummary {
            total: params.iter().map(|p| p.numel()).sum(),
            trainable: params.iter().filter(|p| p.requires_grad()).map(|p| p.numel()).sum(),
        }
    }

    /// Log the parameter summary and return it
    pub fn print_trainable_parameters(&self) -> ParameterSummary {
        let summary = self.parameter_summary();
        info!("{summary}");
        summary
    }

    /// Write the artifacts `request` covers through the backend
    pub fn save_to_checkpoint(&mut self, request: &CheckpointRequest) -> Result<Vec<PathBuf>> {
        self.backend.save_checkpoint(self.engine.as_ref(), &self.state, request)
    }

    /// Restore the artifacts `request` covers and set the resume point
    pub fn resume_from_checkpoint(&mut self, request: &CheckpointRequest) -> Result<()> {
        self.backend.resume_checkpoint(self.engine.as_mut(), &mut self.state, request)
    }

    pub fn save_weights(&self, path: impl AsRef<Path>, mapping: Option<&KeyMapping>, trainable_only: bool) -> Result<()> {
        checkpoint::save_weights(self.backend.unwrap_model(), path.as_ref(), mapping, trainable_only)
    }

    pub fn load_weights(
        &mut self,
        paths: impl Into<WeightPaths>,
        strict: bool,
        mapping: Option<&KeyMapping>,
    ) -> Result<Vec<LoadReport>> {
        checkpoint::load_weights(self.backend.unwrap_model_mut(), &paths.into(), strict, mapping)
    }

    /// Resume from an explicit step, without a checkpoint
    pub fn set_resume_point(&mut self, resume_epoch: usize, resume_step: usize) {
        self.state.resume_epoch = resume_epoch;
        self.state.resume_step = resume_step;
    }

    pub fn module(&self) -> &M {
        self.backend.unwrap_model()
    }

    pub fn module_mut(&mut self) -> &mut M {
        self.backend.unwrap_model_mut()
    }

    pub fn backend(&self) -> &dyn Backend<M> {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn step_engine(&self) -> Option<&StepEngine> {
        self.engine.as_ref()
    }

    pub fn step_engine_mut(&mut self) -> Option<&mut StepEngine> {
        self.engine.as_mut()
    }

    /// Keyed metric names, `loss` first
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.names().map(str::to_string).collect()
    }

    /// Current learning rate, when the optimizer exposes one
    pub fn learning_rate(&self) -> Option<f32> {
        self.engine.as_ref().and_then(|e| self.backend.learning_rate(e))
    }

    pub fn diagnostics_mut(&mut self) -> &mut FaultDiagnostics<M::Input, Y> {
        &mut self.diagnostics
    }

    pub fn last_batch(&self) -> Option<&(M::Input, Y)> {
        self.last_batch.as_ref()
    }

    pub(crate) fn require_compiled(&self) -> Result<()> {
        if self.is_compiled() {
            Ok(())
        } else {
            Err(Error::NotCompiled)
        }
    }
}
