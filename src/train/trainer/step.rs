//! Training step operations

use super::core::Trainer;
use super::feed::BatchFeed;
use crate::data::DataSource;
use crate::engine::{Module, Scaled};
use crate::precision::Precision;
use crate::train::callback::CallbackList;
use crate::train::{LogRecord, StepOutcome};
use crate::{Error, Result};

/// Aggregate of one optimization step over its micro-batches
#[derive(Debug)]
pub(crate) struct StepReport<O> {
    /// Mean of the micro-batch losses
    pub loss: f32,
    /// Mean of each loss detail, in first-seen order
    pub details: Vec<(String, f32)>,
    /// Output of the last micro-batch
    pub output: O,
    pub outcome: StepOutcome,
}

fn accumulate(into: &mut Vec<(String, f32)>, details: Vec<(String, f32)>, factor: f32) {
    for (name, value) in details {
        match into.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 += value * factor,
            None => into.push((name, value * factor)),
        }
    }
}

impl<M: Module, Y> Trainer<M, Y> {
    /// Forward, loss and backward over `grad_accumulation_steps`
    /// micro-batches, then one parameter update
    pub(crate) fn train_step<D>(
        &mut self,
        feed: &mut BatchFeed<'_, D>,
        callbacks: &mut CallbackList,
    ) -> Result<StepReport<M::Output>>
    where
        D: DataSource<Input = M::Input, Target = Y>,
    {
        let engine = self.engine.as_mut().ok_or(Error::NotCompiled)?;
        let criterion = self.criterion.as_ref().ok_or(Error::NotCompiled)?;
        let micro_batches = engine.grad_accumulation_steps();
        let factor = engine.loss_factor();
        let precision = engine.precision();

        let mut loss = 0.0;
        let mut details = Vec::new();
        let mut output = None;
        for _ in 0..micro_batches {
            let batch = feed.next_batch(&mut self.state, callbacks)?;
            let (x, y) = self.last_batch.insert(batch);

            self.backend.unwrap_model_mut().autocast(precision);
            let forward = self.backend.forward(x);
            self.backend.unwrap_model_mut().autocast(Precision::Fp32);
            let out = forward?;

            let normalized = criterion(&out, y)?.normalize()?;
            let scaled = Scaled::new(normalized.loss.as_ref(), factor);
            self.backend.loss_backward(engine, &scaled)?;
            callbacks.on_train_step_end(&self.state)?;

            loss += normalized.loss.item() * factor;
            accumulate(&mut details, normalized.details, factor);
            output = Some(out);
        }

        let output = output.ok_or_else(|| Error::config("grad_accumulation_steps must be > 0"))?;
        let outcome = self.backend.step(engine)?;
        Ok(StepReport { loss, details, output, outcome })
    }

    /// Fresh log record for a step, learning rate first
    pub(crate) fn step_logs(&self) -> LogRecord {
        let mut logs = LogRecord::new();
        if let Some(lr) = self.learning_rate() {
            logs.insert("lr", lr);
        }
        logs
    }
}
