//! Single-process backend

use super::Backend;
use crate::engine::Module;

/// Runs everything in-process on the module it owns
#[derive(Debug, Clone, Default)]
pub struct Plain<M> {
    module: M,
}

impl<M> Plain<M> {
    pub fn new(module: M) -> Self {
        Self { module }
    }

    pub fn into_inner(self) -> M {
        self.module
    }
}

impl<M: Module> Backend<M> for Plain<M> {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn unwrap_model(&self) -> &M {
        &self.module
    }

    fn unwrap_model_mut(&mut self) -> &mut M {
        &mut self.module
    }
}
