//! Backend delegating to a third-party training engine.
//!
//! Engines that own the optimizer take over backward, the update and
//! checkpoint I/O. Engines that do not (mixed-precision accelerators)
//! only take backward and data preparation; the trainer's own
//! [`StepEngine`] keeps the update.

mod config;

pub use config::{EngineArgs, EngineConfig, Mismatch};

use super::{Backend, DataHandle};
use crate::checkpoint::{CheckpointRequest, StepsRecord};
use crate::config::TrainerConfig;
use crate::engine::{Differentiable, Module};
use crate::train::{RunState, StepEngine, StepOutcome};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde_json::Value;
use std::path::PathBuf;

/// Arguments an engine checkpoint call accepts
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCheckpointArgs {
    pub dir: PathBuf,
    pub tag: Option<String>,
    pub strict: bool,
    /// Opaque state stored alongside the engine's own files
    pub client_state: Option<Value>,
}

impl EngineCheckpointArgs {
    /// Keep the fields an engine understands, logging the rest
    pub fn from_request(request: &CheckpointRequest, client_state: Option<Value>) -> Result<Self> {
        let dir = request
            .save_dir
            .clone()
            .ok_or_else(|| Error::config("engine checkpoints need a save directory"))?;
        let dropped: Vec<&str> = [
            ("model_path", request.model_path.is_some()),
            ("optimizer_path", request.optimizer_path.is_some()),
            ("scheduler_path", request.scheduler_path.is_some()),
            ("steps_params_path", request.steps_params_path.is_some()),
            ("mapping", request.mapping.is_some()),
            ("trainable_only", request.trainable_only),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        if !dropped.is_empty() {
            debug!("engine checkpoint ignores {}", dropped.join(", "));
        }
        Ok(Self { dir, tag: request.tag.clone(), strict: request.strict, client_state })
    }
}

/// A third-party engine wrapping the module's training mechanics
pub trait TrainingEngine<M: Module> {
    fn name(&self) -> &'static str;

    /// Whether the engine manages the optimizer (and the update) itself
    fn owns_optimizer(&self) -> bool;

    fn micro_batch_size(&self) -> Option<usize> {
        None
    }

    fn prepare(&mut self, _data: &mut dyn DataHandle) -> Result<()> {
        Ok(())
    }

    /// Receive the engine config after its placeholders are filled
    fn configure(&mut self, _config: &EngineConfig) -> Result<()> {
        Ok(())
    }

    fn backward(&mut self, module: &mut M, loss: &dyn Differentiable) -> Result<()>;

    fn step(&mut self, _module: &mut M) -> Result<()> {
        Err(Error::engine(format!("{} does not own an optimizer", self.name())))
    }

    fn learning_rate(&self) -> Option<f32> {
        None
    }

    fn save_checkpoint(&mut self, _module: &M, _args: &EngineCheckpointArgs) -> Result<Vec<PathBuf>> {
        Err(Error::engine(format!("{} does not write checkpoints", self.name())))
    }

    /// Restore and return the stored client state
    fn load_checkpoint(&mut self, _module: &mut M, _args: &EngineCheckpointArgs) -> Result<Option<Value>> {
        Err(Error::engine(format!("{} does not read checkpoints", self.name())))
    }

    fn is_primary(&self) -> bool {
        true
    }
}

/// Backend driving a [`TrainingEngine`]
pub struct ExternalEngine<M, E> {
    module: M,
    engine: E,
    config: Option<EngineConfig>,
    world_size: usize,
    hidden_size: Option<usize>,
}

impl<M: Module, E: TrainingEngine<M>> ExternalEngine<M, E> {
    pub fn new(module: M, engine: E) -> Self {
        Self { module, engine, config: None, world_size: 1, hidden_size: None }
    }

    /// Attach an engine config; its `"auto"` values are filled from the
    /// trainer settings at the start of every `fit`
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_world_size(mut self, world_size: usize) -> Self {
        self.world_size = world_size.max(1);
        self
    }

    /// Model hidden size, used to size communication buckets
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = Some(hidden_size);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    fn expected_micro_batch(&self) -> Option<usize> {
        self.engine
            .micro_batch_size()
            .or_else(|| self.config.as_ref().and_then(EngineConfig::micro_batch_size))
    }
}

impl<M: Module, E: TrainingEngine<M>> Backend<M> for ExternalEngine<M, E> {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    fn unwrap_model(&self) -> &M {
        &self.module
    }

    fn unwrap_model_mut(&mut self) -> &mut M {
        &mut self.module
    }

    fn prepare_data(&mut self, data: &mut dyn DataHandle) -> Result<()> {
        if let (Some(expected), Some(actual)) = (self.expected_micro_batch(), data.batch_size()) {
            if expected != actual {
                warn!(
                    "{} expects micro batch size {expected} but the data source yields {actual}",
                    self.engine.name()
                );
            }
        }
        self.engine.prepare(data)
    }

    fn configure_run(&mut self, config: &TrainerConfig, state: &RunState, batch_size: Option<usize>) -> Result<()> {
        let Some(engine_config) = self.config.as_mut() else {
            return Ok(());
        };
        let args = EngineArgs::from_trainer(engine_config.original(), config, self.world_size, batch_size)?;
        engine_config.resolve(&args, self.hidden_size, Some(state.total_steps))?;
        debug!(
            "{} config resolved with {} mismatches",
            self.engine.name(),
            engine_config.mismatches().len()
        );
        self.engine.configure(engine_config)
    }

    fn loss_backward(&mut self, _engine: &mut StepEngine, loss: &dyn Differentiable) -> Result<()> {
        self.engine.backward(&mut self.module, loss)
    }

    fn step(&mut self, engine: &mut StepEngine) -> Result<StepOutcome> {
        if self.engine.owns_optimizer() {
            self.engine.step(&mut self.module)?;
            return Ok(StepOutcome { skipped: false, grad_norm: None, scale: 1.0 });
        }
        let mut params = self.module.parameters_mut();
        engine.step(&mut params)
    }

    fn learning_rate(&self, engine: &StepEngine) -> Option<f32> {
        if self.engine.owns_optimizer() {
            self.engine.learning_rate().or_else(|| engine.learning_rate())
        } else {
            engine.learning_rate()
        }
    }

    fn accepts_optimizer(&self) -> bool {
        !self.config.as_ref().is_some_and(EngineConfig::offloads_optimizer)
    }

    fn save_checkpoint(
        &mut self,
        engine: Option<&StepEngine>,
        state: &RunState,
        request: &CheckpointRequest,
    ) -> Result<Vec<PathBuf>> {
        if !self.engine.owns_optimizer() {
            return crate::checkpoint::save_checkpoint(&self.module, engine, state, request);
        }
        let client_state = serde_json::to_value(StepsRecord::from_state(state))?;
        let args = EngineCheckpointArgs::from_request(request, Some(client_state))?;
        let written = self.engine.save_checkpoint(&self.module, &args)?;
        info!("{} checkpoint saved to {}", self.engine.name(), args.dir.display());
        Ok(written)
    }

    fn resume_checkpoint(
        &mut self,
        engine: Option<&mut StepEngine>,
        state: &mut RunState,
        request: &CheckpointRequest,
    ) -> Result<()> {
        if !self.engine.owns_optimizer() {
            return crate::checkpoint::resume_checkpoint(&mut self.module, engine, state, request);
        }
        let args = EngineCheckpointArgs::from_request(request, None)?;
        match self.engine.load_checkpoint(&mut self.module, &args)? {
            Some(client_state) => {
                let record: StepsRecord = serde_json::from_value(client_state)?;
                record.apply_to(state);
            }
            None => warn!("{} checkpoint carried no resume point", self.engine.name()),
        }
        info!("{} checkpoint resumed from {}", self.engine.name(), args.dir.display());
        Ok(())
    }

    fn is_primary(&self) -> bool {
        self.engine.is_primary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainerConfig;
    use crate::data::VecDataSource;
    use crate::engine::{Param, Parameter};
    use crate::optim::{Optimizer, SGD};
    use crate::train::{LossOutput, Trainer};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct Linear {
        w: Param,
    }

    impl Module for Linear {
        type Input = f32;
        type Output = f32;

        fn forward(&mut self, input: &f32) -> Result<f32> {
            Ok(self.w.data()[0] * input)
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

    /// Engine with its own plain-SGD update and in-memory checkpoints
    #[derive(Default)]
    struct OwningEngine {
        backwards: usize,
        steps: usize,
        saved: HashMap<PathBuf, (Vec<f32>, Option<Value>)>,
    }

    impl TrainingEngine<Linear> for OwningEngine {
        fn name(&self) -> &'static str {
            "owning"
        }

        fn owns_optimizer(&self) -> bool {
            true
        }

        fn micro_batch_size(&self) -> Option<usize> {
            Some(4)
        }

        fn backward(&mut self, module: &mut Linear, loss: &dyn Differentiable) -> Result<()> {
            self.backwards += 1;
            module.w.accumulate_grad(&[loss.item()], 1.0);
            Ok(())
        }

        fn step(&mut self, module: &mut Linear) -> Result<()> {
            self.steps += 1;
            let grad = module.w.grad().map_or(0.0, |g| g[0]);
            module.w.data_mut()[0] -= 0.5 * grad;
            module.w.zero_grad();
            Ok(())
        }

        fn learning_rate(&self) -> Option<f32> {
            Some(0.5)
        }

        fn save_checkpoint(&mut self, module: &Linear, args: &EngineCheckpointArgs) -> Result<Vec<PathBuf>> {
            self.saved.insert(args.dir.clone(), (module.w.data().to_vec(), args.client_state.clone()));
            Ok(vec![args.dir.clone()])
        }

        fn load_checkpoint(&mut self, module: &mut Linear, args: &EngineCheckpointArgs) -> Result<Option<Value>> {
            let (weights, client) = self
                .saved
                .get(&args.dir)
                .cloned()
                .ok_or_else(|| Error::engine("no such checkpoint"))?;
            module.w.data_mut().copy_from_slice(&weights);
            Ok(client)
        }
    }

    /// Engine that only handles backward
    struct Accelerator;

    impl TrainingEngine<Linear> for Accelerator {
        fn name(&self) -> &'static str {
            "accelerator"
        }

        fn owns_optimizer(&self) -> bool {
            false
        }

        fn backward(&mut self, module: &mut Linear, loss: &dyn Differentiable) -> Result<()> {
            module.w.accumulate_grad(&[loss.item()], 1.0);
            Ok(())
        }
    }

    /// Accelerator keeping the config it was handed
    struct Recording {
        configured: Arc<Mutex<Option<Value>>>,
    }

    impl TrainingEngine<Linear> for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn owns_optimizer(&self) -> bool {
            false
        }

        fn configure(&mut self, config: &EngineConfig) -> Result<()> {
            *self.configured.lock().unwrap() = Some(config.tree().clone());
            Ok(())
        }

        fn backward(&mut self, module: &mut Linear, loss: &dyn Differentiable) -> Result<()> {
            module.w.accumulate_grad(&[loss.item()], 1.0);
            Ok(())
        }
    }

    fn step_engine() -> StepEngine {
        let opt: Box<dyn Optimizer> = Box::new(SGD::new(0.1, 0.0));
        StepEngine::new(Some(opt), Vec::new(), &TrainerConfig::default())
    }

    #[test]
    fn test_owning_engine_takes_the_update() {
        let mut backend = ExternalEngine::new(Linear { w: Param::new("w", vec![1.0]) }, OwningEngine::default());
        let mut engine = step_engine();
        backend.loss_backward(&mut engine, &0.4f32).unwrap();
        let outcome = backend.step(&mut engine).unwrap();

        assert!(!outcome.skipped);
        approx::assert_relative_eq!(backend.unwrap_model().w.data()[0], 0.8);
        assert_eq!((backend.engine().backwards, backend.engine().steps), (1, 1));
        assert_eq!(backend.learning_rate(&engine), Some(0.5));
    }

    #[test]
    fn test_accelerator_keeps_trainer_update() {
        let mut backend = ExternalEngine::new(Linear { w: Param::new("w", vec![1.0]) }, Accelerator);
        let mut engine = step_engine();
        backend.loss_backward(&mut engine, &2.0f32).unwrap();
        backend.step(&mut engine).unwrap();

        approx::assert_relative_eq!(backend.unwrap_model().w.data()[0], 0.8);
        assert_eq!(backend.learning_rate(&engine), Some(0.1));
    }

    #[test]
    fn test_engine_checkpoint_carries_resume_point() {
        let mut backend = ExternalEngine::new(Linear { w: Param::new("w", vec![3.0]) }, OwningEngine::default());
        let state = RunState { steps_per_epoch: 4, epoch: 1, local_step: 3, ..Default::default() };
        let request = CheckpointRequest::dir("ckpt").with_tag("best");

        let written = backend.save_checkpoint(None, &state, &request).unwrap();
        assert_eq!(written, vec![PathBuf::from("ckpt")]);

        backend.unwrap_model_mut().w.data_mut()[0] = 0.0;
        let mut fresh = RunState::default();
        backend.resume_checkpoint(None, &mut fresh, &request).unwrap();
        assert_eq!(backend.unwrap_model().w.data(), &[3.0]);
        assert_eq!((fresh.resume_step, fresh.resume_epoch), (0, 2));
    }

    #[test]
    fn test_engine_checkpoint_needs_dir() {
        let request = CheckpointRequest::default().with_model_path("model.safetensors");
        let err = EngineCheckpointArgs::from_request(&request, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_offloaded_optimizer_refused() {
        let config = EngineConfig::new(serde_json::json!({
            "zero_optimization": {"offload_optimizer": {"device": "cpu"}}
        }));
        let backend = ExternalEngine::new(Linear { w: Param::new("w", vec![1.0]) }, OwningEngine::default())
            .with_config(config);
        assert!(!backend.accepts_optimizer());
    }

    #[test]
    fn test_prepare_tolerates_batch_mismatch() {
        let mut backend = ExternalEngine::new(Linear { w: Param::new("w", vec![1.0]) }, OwningEngine::default());
        let mut data = VecDataSource::new(vec![(1.0f32, 1.0f32)]).with_batch_size(2);
        backend.prepare_data(&mut data).unwrap();
    }

    #[test]
    fn test_run_start_fills_auto_from_trainer() {
        let config = EngineConfig::new(json!({
            "train_micro_batch_size_per_gpu": "auto",
            "gradient_accumulation_steps": "auto",
            "gradient_clipping": 0.5,
            "scheduler": {"params": {"total_num_steps": "auto"}}
        }));
        let mut backend = ExternalEngine::new(Linear { w: Param::new("w", vec![1.0]) }, OwningEngine::default())
            .with_config(config);
        let trainer = TrainerConfig { grad_accumulation_steps: 4, clip_grad_norm: Some(1.0), ..Default::default() };
        let state = RunState { total_steps: 12, ..Default::default() };

        backend.configure_run(&trainer, &state, Some(2)).unwrap();

        let resolved = backend.config().unwrap();
        assert_eq!(resolved.get("gradient_accumulation_steps"), Some(&json!(4)));
        assert_eq!(resolved.get("train_micro_batch_size_per_gpu"), Some(&json!(2)));
        assert_eq!(resolved.get("scheduler.params.total_num_steps"), Some(&json!(12)));
        assert_eq!(resolved.get("gradient_clipping"), Some(&json!(0.5)));
        let paths: Vec<_> = resolved.mismatches().iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["gradient_clipping"]);
    }

    #[test]
    fn test_fit_hands_resolved_config_to_engine() {
        let configured = Arc::new(Mutex::new(None));
        let config = EngineConfig::new(json!({
            "gradient_accumulation_steps": "auto",
            "bf16": {"enabled": "auto"},
            "scheduler": {"params": {"total_num_steps": "auto"}}
        }));
        let backend = ExternalEngine::new(
            Linear { w: Param::new("w", vec![0.0]) },
            Recording { configured: configured.clone() },
        )
        .with_config(config);
        let trainer_config = TrainerConfig { grad_accumulation_steps: 2, ..Default::default() }.with_smoothing(None);
        let mut trainer: Trainer<Linear, f32> = Trainer::with_backend(backend).with_config(trainer_config).unwrap();
        trainer
            .compile(
                |out: &f32, y: &f32| Ok(LossOutput::scalar(out - y)),
                Some(Box::new(SGD::new(0.0, 0.0))),
                Vec::new(),
                Vec::new(),
            )
            .unwrap();

        let mut data = VecDataSource::new(vec![(1.0f32, 1.0f32); 4]);
        trainer.fit(&mut data, None, 3, Vec::new(), false).unwrap();

        let tree = configured.lock().unwrap().clone().unwrap();
        assert_eq!(tree["gradient_accumulation_steps"], json!(2));
        assert_eq!(tree["bf16"]["enabled"], json!(false));
        assert_eq!(tree["scheduler"]["params"]["total_num_steps"], json!(6));
    }
}
