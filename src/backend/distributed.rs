//! Multi-process data-parallel backend

use super::{Backend, DataHandle, ProcessContext};
use crate::config::TrainerConfig;
use crate::data::DistributedSampler;
use crate::engine::{Module, Parameter};
use crate::train::{RunState, StepEngine, StepOutcome};
use crate::Result;
use log::{info, warn};
use std::sync::Arc;

/// Collective operations over the process group
pub trait GradientSync: Send + Sync {
    /// Average gradients across all ranks, in place
    fn all_reduce(&self, params: &mut [&mut dyn Parameter]) -> Result<()>;

    /// Overwrite parameters with the values held by `root`
    fn broadcast(&self, _params: &mut [&mut dyn Parameter], _root: usize) -> Result<()> {
        Ok(())
    }
}

/// Synchronization for a world of one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSync;

impl GradientSync for NoOpSync {
    fn all_reduce(&self, _params: &mut [&mut dyn Parameter]) -> Result<()> {
        Ok(())
    }
}

/// One process per rank; gradients are all-reduced before every update
pub struct Distributed<M> {
    module: M,
    context: ProcessContext,
    sync: Arc<dyn GradientSync>,
    broadcast_pending: bool,
}

impl<M: Module> Distributed<M> {
    pub fn new(module: M, context: ProcessContext, sync: Arc<dyn GradientSync>) -> Self {
        let broadcast_pending = context.world_size > 1;
        Self { module, context, sync, broadcast_pending }
    }

    /// Read the launcher environment, with master ranks from `config`
    pub fn from_config(module: M, config: &TrainerConfig, seed: u64, sync: Arc<dyn GradientSync>) -> Result<Self> {
        let context = ProcessContext::init(&config.master_ranks, seed)?;
        Ok(Self::new(module, context, sync))
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    fn sync_initial_weights(&mut self) -> Result<()> {
        if self.broadcast_pending {
            let mut params = self.module.parameters_mut();
            self.sync.broadcast(&mut params, 0)?;
            self.broadcast_pending = false;
        }
        Ok(())
    }
}

impl<M: Module> Backend<M> for Distributed<M> {
    fn name(&self) -> &'static str {
        "distributed"
    }

    fn unwrap_model(&self) -> &M {
        &self.module
    }

    fn unwrap_model_mut(&mut self) -> &mut M {
        &mut self.module
    }

    fn prepare_data(&mut self, data: &mut dyn DataHandle) -> Result<()> {
        self.sync_initial_weights()?;
        if data.has_sampler() {
            return Ok(());
        }
        let sampler = DistributedSampler::new(self.context.world_size, self.context.rank, self.context.base_seed);
        if data.attach_sampler(Box::new(sampler)) {
            info!(
                "attached distributed sampler (rank {}/{})",
                self.context.rank, self.context.world_size
            );
        } else {
            warn!("data source does not accept a sampler; every rank will see the full dataset");
        }
        Ok(())
    }

    /// The configured master ranks decide which processes run callbacks
    fn configure_run(&mut self, config: &TrainerConfig, _state: &RunState, _batch_size: Option<usize>) -> Result<()> {
        let master = config.master_ranks.contains(&self.context.rank);
        if master != self.context.master_process {
            info!("rank {} master={} per master_ranks {:?}", self.context.rank, master, config.master_ranks);
            self.context.master_process = master;
        }
        Ok(())
    }

    fn step(&mut self, engine: &mut StepEngine) -> Result<StepOutcome> {
        let mut params = self.module.parameters_mut();
        self.sync.all_reduce(&mut params)?;
        engine.step(&mut params)
    }

    fn is_primary(&self) -> bool {
        self.context.master_process
    }
}
