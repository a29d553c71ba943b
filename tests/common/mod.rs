//! Shared fixtures for the integration tests
//!
//! `Linear` is a one-input affine model with analytic gradients, so runs
//! are deterministic and every update can be checked by hand.

#![allow(dead_code)]

use ajustar::engine::{Differentiable, Module, Param, Parameter};
use ajustar::optim::{LRScheduler, Optimizer, StepDecayLR, SGD};
use ajustar::train::{Callback, CallbackAction, LogRecord, LossOutput, RunState};
use ajustar::{Error, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Model and loss
// =============================================================================

/// Output of [`Linear`], carrying the input needed for the gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: f32,
    pub input: f32,
}

/// `y = w * x + b`
pub struct Linear {
    pub w: Param,
    pub b: Param,
    training: bool,
}

impl Linear {
    pub fn new(w: f32, b: f32) -> Self {
        Self { w: Param::new("w", vec![w]), b: Param::new("b", vec![b]), training: false }
    }

    pub fn weights(&self) -> (f32, f32) {
        (self.w.data()[0], self.b.data()[0])
    }
}

impl Module for Linear {
    type Input = f32;
    type Output = Prediction;

    fn forward(&mut self, input: &f32) -> Result<Prediction> {
        Ok(Prediction { value: self.w.data()[0] * input + self.b.data()[0], input: *input })
    }

    fn parameters(&self) -> Vec<&dyn Parameter> {
        vec![&self.w, &self.b]
    }

    fn parameters_mut(&mut self) -> Vec<&mut dyn Parameter> {
        vec![&mut self.w, &mut self.b]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

/// `(prediction - target)^2`
pub struct SquaredError {
    residual: f32,
    input: f32,
}

impl Differentiable for SquaredError {
    fn item(&self) -> f32 {
        self.residual * self.residual
    }

    fn backward(&self, params: &mut [&mut dyn Parameter], grad_scale: f32, _: bool) -> Result<()> {
        let d = 2.0 * self.residual;
        for param in params.iter_mut() {
            match param.name() {
                "w" => param.accumulate_grad(&[d * self.input], grad_scale),
                "b" => param.accumulate_grad(&[d], grad_scale),
                other => return Err(Error::engine(format!("unexpected parameter {other}"))),
            }
        }
        Ok(())
    }
}

pub fn mse(out: &Prediction, y: &f32) -> Result<LossOutput> {
    Ok(LossOutput::scalar(SquaredError { residual: out.value - y, input: out.input }))
}

/// `(x, y)` batches with `x = 1` and `y = 1, 2, ..., n`
pub fn ramp(n: usize) -> Vec<(f32, f32)> {
    (1..=n).map(|i| (1.0, i as f32)).collect()
}

// =============================================================================
// Counting optimizer and scheduler
// =============================================================================

/// SGD that counts its updates
pub struct CountingSgd {
    inner: SGD,
    pub steps: Arc<AtomicUsize>,
}

impl CountingSgd {
    pub fn new(lr: f32) -> Self {
        Self { inner: SGD::new(lr, 0.0), steps: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.steps.clone()
    }
}

impl Optimizer for CountingSgd {
    fn step(&mut self, params: &mut [&mut dyn Parameter]) -> Result<()> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        self.inner.step(params)
    }

    fn lr(&self) -> f32 {
        self.inner.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.inner.set_lr(lr);
    }

    fn state_dict(&self) -> Value {
        self.inner.state_dict()
    }

    fn load_state_dict(&mut self, state: &Value) -> Result<()> {
        self.inner.load_state_dict(state)
    }
}

/// Step decay that counts its steps
pub struct CountingScheduler {
    inner: StepDecayLR,
    pub steps: Arc<AtomicUsize>,
}

impl CountingScheduler {
    pub fn new(lr: f32) -> Self {
        Self { inner: StepDecayLR::new(lr, 1, 1.0), steps: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.steps.clone()
    }
}

impl LRScheduler for CountingScheduler {
    fn get_lr(&self) -> f32 {
        self.inner.get_lr()
    }

    fn last_step(&self) -> usize {
        self.inner.last_step()
    }

    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.steps.fetch_add(1, Ordering::SeqCst);
        self.inner.step(optimizer);
    }

    fn state_dict(&self) -> Value {
        self.inner.state_dict()
    }

    fn load_state_dict(&mut self, state: &Value) -> Result<()> {
        self.inner.load_state_dict(state)
    }
}

// =============================================================================
// Recording callback
// =============================================================================

pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

/// Records `label:event@global_step` and the loss each step ends with
pub struct Recorder {
    label: &'static str,
    events: Events,
    pub losses: Arc<Mutex<Vec<f32>>>,
}

impl Recorder {
    pub fn new(label: &'static str, events: &Events) -> Self {
        Self { label, events: events.clone(), losses: Arc::new(Mutex::new(Vec::new())) }
    }

    fn push(&self, event: &str, state: &RunState) {
        self.events.lock().unwrap().push(format!("{}:{event}@{}", self.label, state.global_step));
    }
}

impl Callback for Recorder {
    fn on_batch_end(&mut self, state: &RunState, logs: &mut LogRecord) -> Result<CallbackAction> {
        self.push("batch_end", state);
        if let Some(loss) = logs.get("loss") {
            self.losses.lock().unwrap().push(loss);
        }
        Ok(CallbackAction::Continue)
    }

    fn on_dataloader_end(&mut self, state: &RunState) -> Result<()> {
        self.push("dataloader_end", state);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Recorder"
    }
}

/// Fails `on_batch_end` at one global step
pub struct FailAt(pub usize);

impl Callback for FailAt {
    fn on_batch_end(&mut self, state: &RunState, _logs: &mut LogRecord) -> Result<CallbackAction> {
        if state.global_step == self.0 {
            return Err(Error::Callback { name: "FailAt".into(), message: format!("boom at {}", self.0) });
        }
        Ok(CallbackAction::Continue)
    }
}

/// Global steps seen by a [`Recorder`]
pub fn steps_of(events: &Events, label: &str, event: &str) -> Vec<usize> {
    let prefix = format!("{label}:{event}@");
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.strip_prefix(&prefix).and_then(|s| s.parse().ok()))
        .collect()
}
