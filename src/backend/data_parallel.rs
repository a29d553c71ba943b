//! Single-process multi-device forward

use super::Backend;
use crate::engine::Module;
use crate::Result;

/// Replicates the module, scatters the input, gathers the outputs.
///
/// Device placement is the collaborator's concern; gradients land in the
/// module's own parameters.
pub trait ParallelForward<M: Module> {
    fn forward(&self, module: &mut M, input: &M::Input) -> Result<M::Output>;

    fn device_count(&self) -> usize;
}

/// Data-parallel backend: forward through a [`ParallelForward`],
/// everything else as [`Plain`](super::Plain)
pub struct DataParallel<M: Module> {
    module: M,
    parallel: Box<dyn ParallelForward<M>>,
}

impl<M: Module> DataParallel<M> {
    pub fn new(module: M, parallel: impl ParallelForward<M> + 'static) -> Self {
        Self { module, parallel: Box::new(parallel) }
    }

    pub fn device_count(&self) -> usize {
        self.parallel.device_count()
    }
}

impl<M: Module> Backend<M> for DataParallel<M> {
    fn name(&self) -> &'static str {
        "data_parallel"
    }

    fn unwrap_model(&self) -> &M {
        &self.module
    }

    fn unwrap_model_mut(&mut self) -> &mut M {
        &mut self.module
    }

    fn forward(&mut self, input: &M::Input) -> Result<M::Output> {
        self.parallel.forward(&mut self.module, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Param, Parameter};

    struct Scale {
        w: Param,
    }

    impl Module for Scale {
        type Input = Vec<f32>;
        type Output = Vec<f32>;

        fn forward(&mut self, input: &Vec<f32>) -> Result<Vec<f32>> {
            Ok(input.iter().map(|x| x * self.w.data()[0]).collect())
        }

        fn parameters(&self) -> Vec<&dyn Parameter> {
            vec![&self.w]
        }

        fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter> {
            vec![&mut self.w]
        }

        fn set_training(&mut self, _training: bool) {}

        fn is_training(&self) -> bool {
            true
        }
    }

    /// Splits the input into `devices` chunks and concatenates the results
    struct Chunked {
        devices: usize,
    }

    impl ParallelForward<Scale> for Chunked {
        fn forward(&self, module: &mut Scale, input: &Vec<f32>) -> Result<Vec<f32>> {
            let size = input.len().div_ceil(self.devices).max(1);
            let mut out = Vec::with_capacity(input.len());
            for chunk in input.chunks(size) {
                out.extend(module.forward(&chunk.to_vec())?);
            }
            Ok(out)
        }

        fn device_count(&self) -> usize {
            self.devices
        }
    }

    #[test]
    fn test_forward_goes_through_collaborator() {
        let mut backend = DataParallel::new(Scale { w: Param::new("w", vec![2.0]) }, Chunked { devices: 2 });
        let out = backend.forward(&vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(out, vec![2.0, 4.0, 6.0]);
        assert_eq!(backend.device_count(), 2);
        assert_eq!(backend.unwrap_model().w.data(), &[2.0]);
        assert_eq!(backend.name(), "data_parallel");
    }
}
