//! A trainer that is itself a [`Module`]

use super::Trainer;
use crate::engine::{LoadReport, Module, Parameter, StateDict};
use crate::precision::Precision;
use crate::Result;
use std::ops::{Deref, DerefMut};

/// Wraps a [`Trainer`] so it can be used wherever a module is expected
/// (nested in a larger model, handed to code that only knows `Module`),
/// while keeping `compile`/`fit`/`predict` reachable through `Deref`.
pub struct TrainableAdapter<M: Module, Y> {
    trainer: Trainer<M, Y>,
}

impl<M: Module, Y> TrainableAdapter<M, Y> {
    pub fn new(trainer: Trainer<M, Y>) -> Self {
        Self { trainer }
    }

    pub fn into_inner(self) -> Trainer<M, Y> {
        self.trainer
    }
}

impl<M: Module + 'static, Y> From<M> for TrainableAdapter<M, Y> {
    fn from(module: M) -> Self {
        Self::new(Trainer::new(module))
    }
}

impl<M: Module, Y> Deref for TrainableAdapter<M, Y> {
    type Target = Trainer<M, Y>;

    fn deref(&self) -> &Self::Target {
        &self.trainer
    }
}

impl<M: Module, Y> DerefMut for TrainableAdapter<M, Y> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.trainer
    }
}

impl<M: Module, Y> Module for TrainableAdapter<M, Y> {
    type Input = M::Input;
    type Output = M::Output;

    fn forward(&mut self, input: &Self::Input) -> Result<Self::Output> {
        self.trainer.forward(input)
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        self.trainer.module().parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter> {
        self.trainer.module_mut().parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.trainer.module_mut().set_training(training);
    }

    fn is_training(&self) -> bool {
        self.trainer.module().is_training()
    }

    fn autocast(&mut self, precision: Precision) {
        self.trainer.module_mut().autocast(precision);
    }

    fn state_dict(&self) -> StateDict {
        self.trainer.module().state_dict()
    }

    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<LoadReport> {
        self.trainer.module_mut().load_state_dict(state, strict)
    }
}
