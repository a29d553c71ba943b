//! Backward and parameter-update sequencing
//!
//! Owns the optimizer, the schedulers and the optional loss scaler. One
//! [`StepEngine::step`] call per `grad_accumulation_steps` backward calls.

use crate::config::TrainerConfig;
use crate::engine::{Differentiable, Parameter, Scaled};
use crate::optim::{clip_grad_norm, LRScheduler, Optimizer};
use crate::precision::{GradScaler, Precision};
use crate::{Error, Result};
use log::debug;

/// What happened during one parameter update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// The scaler discarded the update; schedulers were not stepped.
    /// Only a non-finite gradient or a scale backoff counts, scale growth
    /// after a clean step does not.
    pub skipped: bool,
    /// Global gradient norm before clipping, when clipping is enabled
    pub grad_norm: Option<f32>,
    /// Loss scale after the update (1.0 without a scaler)
    pub scale: f32,
}

/// Optimizer, schedulers and loss scaler driven by the run loop
pub struct StepEngine {
    optimizer: Option<Box<dyn Optimizer>>,
    schedulers: Vec<Box<dyn LRScheduler>>,
    scaler: Option<GradScaler>,
    precision: Precision,
    clip_grad_norm: Option<f32>,
    grad_accumulation_steps: usize,
    retain_graph: bool,
    scale_before_step: f32,
}

impl StepEngine {
    /// Build from the trainer config; a scaler is created for fp16 or
    /// when scaler settings are given explicitly
    pub fn new(
        optimizer: Option<Box<dyn Optimizer>>,
        schedulers: Vec<Box<dyn LRScheduler>>,
        config: &TrainerConfig,
    ) -> Self {
        let scaler = (config.precision.needs_scaler() || config.scaler.is_some())
            .then(|| GradScaler::from_config(&config.scaler_config()));
        Self {
            optimizer,
            schedulers,
            scaler,
            precision: config.precision,
            clip_grad_norm: config.clip_grad_norm,
            grad_accumulation_steps: config.grad_accumulation_steps.max(1),
            retain_graph: config.retain_graph,
            scale_before_step: 1.0,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn grad_accumulation_steps(&self) -> usize {
        self.grad_accumulation_steps
    }

    pub fn retain_graph(&self) -> bool {
        self.retain_graph
    }

    pub fn scaler(&self) -> Option<&GradScaler> {
        self.scaler.as_ref()
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }

    pub fn optimizer_mut(&mut self) -> Option<&mut (dyn Optimizer + 'static)> {
        self.optimizer.as_deref_mut()
    }

    pub fn schedulers(&self) -> &[Box<dyn LRScheduler>] {
        &self.schedulers
    }

    pub fn schedulers_mut(&mut self) -> &mut [Box<dyn LRScheduler>] {
        &mut self.schedulers
    }

    /// Current learning rate of the first parameter group
    pub fn learning_rate(&self) -> Option<f32> {
        self.optimizer.as_ref().map(|opt| opt.lr())
    }

    /// Factor applied to every micro-batch loss before backward
    pub fn loss_factor(&self) -> f32 {
        1.0 / self.grad_accumulation_steps as f32
    }

    /// Backward through `loss`, scaled when a scaler is active.
    ///
    /// Records the scale in effect so [`StepEngine::step`] can detect a
    /// skipped update.
    pub fn backward(
        &mut self,
        params: &mut [&mut dyn Parameter],
        loss: &dyn Differentiable,
    ) -> Result<()> {
        match &self.scaler {
            Some(scaler) => {
                self.scale_before_step = scaler.scale();
                Scaled::new(loss, scaler.scale()).backward(params, 1.0, self.retain_graph)
            }
            None => {
                self.scale_before_step = 1.0;
                loss.backward(params, 1.0, self.retain_graph)
            }
        }
    }

    /// Unscale, clip, step the optimizer, update the scaler, zero gradients
    /// and step every scheduler in order unless the update was skipped
    pub fn step(&mut self, params: &mut [&mut dyn Parameter]) -> Result<StepOutcome> {
        let optimizer = self.optimizer.as_mut().ok_or(Error::NotCompiled)?;

        let mut grad_norm = None;
        let (skipped, scale) = match self.scaler.as_mut() {
            Some(scaler) => {
                let finite = scaler.unscale(params);
                if finite {
                    if let Some(max_norm) = self.clip_grad_norm {
                        grad_norm = Some(clip_grad_norm(params, max_norm));
                    }
                    optimizer.step(params)?;
                }
                scaler.update(finite);
                let scale = scaler.scale();
                (!finite || scale < self.scale_before_step, scale)
            }
            None => {
                if let Some(max_norm) = self.clip_grad_norm {
                    grad_norm = Some(clip_grad_norm(params, max_norm));
                }
                optimizer.step(params)?;
                (false, 1.0)
            }
        };

        optimizer.zero_grad(params);

        if skipped {
            debug!(
                "scaler skipped update (scale {} -> {scale}), schedulers held",
                self.scale_before_step
            );
        } else {
            for scheduler in &mut self.schedulers {
                scheduler.step(&mut **optimizer);
            }
        }

        Ok(StepOutcome { skipped, grad_norm, scale })
    }

    /// Scheduler snapshots in list order
    pub fn scheduler_states(&self) -> Vec<serde_json::Value> {
        self.schedulers.iter().map(|s| s.state_dict()).collect()
    }

    /// Restore scheduler snapshots; the count must match
    pub fn load_scheduler_states(&mut self, states: &[serde_json::Value]) -> Result<()> {
        if states.len() != self.schedulers.len() {
            return Err(Error::StateDict(format!(
                "{} scheduler states for {} schedulers",
                states.len(),
                self.schedulers.len()
            )));
        }
        for (scheduler, state) in self.schedulers.iter_mut().zip(states) {
            scheduler.load_state_dict(state)?;
        }
        Ok(())
    }
}
