//! The epoch/step run loop

use super::core::Trainer;
use super::feed::BatchFeed;
use crate::checkpoint::CheckpointRequest;
use crate::data::DataSource;
use crate::engine::Module;
use crate::train::callback::{Callback, CallbackList, Dispatch, History, ProgressBar, TrainParams};
use crate::train::{LogRecord, RunState};
use crate::{Error, Result};
use log::{debug, info};

impl<M: Module, Y> Trainer<M, Y> {
    /// Train for `epochs` epochs and return the recorded history.
    ///
    /// `steps_per_epoch` defaults to the data source's length divided by
    /// the accumulation factor, rounded up. A run resumed from a
    /// checkpoint starts at the stored epoch and step.
    ///
    /// Errors raised inside the loop trigger the configured fault
    /// diagnostics and are then returned unchanged.
    pub fn fit<D>(
        &mut self,
        data: &mut D,
        steps_per_epoch: Option<usize>,
        epochs: usize,
        callbacks: Vec<Box<dyn Callback>>,
        verbose: bool,
    ) -> Result<History>
    where
        D: DataSource<Input = M::Input, Target = Y>,
    {
        self.require_compiled()?;
        self.backend.prepare_data(data)?;
        let steps_per_epoch = self.resolve_steps_per_epoch(data.len(), steps_per_epoch)?;

        self.state = RunState {
            epochs,
            steps_per_epoch,
            total_steps: steps_per_epoch * epochs,
            resume_step: self.state.resume_step,
            resume_epoch: self.state.resume_epoch,
            epoch: self.state.resume_epoch,
            ..Default::default()
        };
        self.backend.configure_run(&self.config, &self.state, data.batch_size())?;

        let mut callbacks = self.build_callbacks(callbacks, verbose);
        let mut feed = BatchFeed::new(data, self.state.resume_epoch);

        match self.run(&mut feed, &mut callbacks) {
            Ok(()) => Ok(callbacks.into_history()),
            Err(err) => {
                self.run_diagnostics(&err);
                Err(err)
            }
        }
    }

    fn resolve_steps_per_epoch(&self, len: Option<usize>, given: Option<usize>) -> Result<usize> {
        let accumulation = self.config.grad_accumulation_steps.max(1);
        let steps = match given {
            Some(steps) => steps,
            None => len
                .map(|n| n.div_ceil(accumulation))
                .ok_or_else(|| Error::config("steps_per_epoch not given and the data source has no length"))?,
        };
        if steps == 0 {
            return Err(Error::config("steps_per_epoch resolved to 0"));
        }
        Ok(steps)
    }

    fn build_callbacks(&self, user: Vec<Box<dyn Callback>>, verbose: bool) -> CallbackList {
        let progress = verbose
            .then(|| Box::new(ProgressBar::new(self.config.progbar.clone())) as Box<dyn Callback>);
        let mut callbacks = CallbackList::assemble(user, self.config.smoothing.as_ref(), progress);

        let enabled = self.backend.is_primary() || self.config.workers_run_callbacks;
        callbacks.set_enabled(enabled);
        if !enabled {
            debug!("callbacks disabled on this process");
        }

        callbacks.set_params(&TrainParams {
            epochs: self.state.epochs,
            steps_per_epoch: self.state.steps_per_epoch,
            total_steps: self.state.total_steps,
            verbose,
            metrics: self.metric_names(),
            resume_step: self.state.resume_step,
        });
        callbacks
    }

    fn run<D>(&mut self, feed: &mut BatchFeed<'_, D>, callbacks: &mut CallbackList) -> Result<()>
    where
        D: DataSource<Input = M::Input, Target = Y>,
    {
        let dispatch = callbacks.on_train_begin(&self.state)?;
        self.apply(dispatch)?;

        let mut logs = LogRecord::new();
        for epoch in self.state.resume_epoch..self.state.epochs {
            self.state.epoch = epoch;
            self.backend.unwrap_model_mut().set_training(true);
            let dispatch = callbacks.on_epoch_begin(&self.state)?;
            self.apply(dispatch)?;

            for local_step in self.state.start_step(epoch)..self.state.steps_per_epoch {
                self.state.enter_step(local_step);
                logs = self.step_logs();
                let dispatch = callbacks.on_batch_begin(&self.state, &mut logs)?;
                self.apply(dispatch)?;

                let report = self.train_step(feed, callbacks)?;
                if report.outcome.skipped {
                    debug!("step {} skipped by the loss scaler", self.state.global_step);
                }
                logs.insert("loss", report.loss);
                logs.extend(report.details.iter().map(|(k, v)| (k.as_str(), *v)));

                let first_step = self.state.is_first_step();
                if first_step && self.config.loss2metrics && !report.details.is_empty() {
                    let names: Vec<String> = report.details.iter().map(|(k, _)| k.clone()).collect();
                    callbacks.add_metrics(&names, Some(1));
                }

                if let Some((_, y)) = &self.last_batch {
                    let discovered = self.metrics.compute_into(&report.output, y, &mut logs);
                    if first_step {
                        callbacks.add_metrics(&discovered, None);
                    }
                }

                let dispatch = callbacks.on_batch_end(&self.state, &mut logs)?;
                self.apply(dispatch)?;

                if first_step && self.config.log_first_step {
                    info!("first step: {}", logs.summary());
                }
            }

            let dispatch = callbacks.on_epoch_end(&self.state, &mut logs)?;
            self.apply(dispatch)?;
            if self.state.stop_training {
                info!("stop requested, training ends after epoch {}", epoch + 1);
                break;
            }
        }

        callbacks.on_train_end(&self.state, &mut logs)
    }

    /// Act on what the callbacks asked for
    fn apply(&mut self, dispatch: Dispatch) -> Result<()> {
        if dispatch.stop {
            self.state.stop_training = true;
        }
        for dir in dispatch.checkpoints {
            self.backend
                .save_checkpoint(self.engine.as_ref(), &self.state, &CheckpointRequest::dir(dir))?;
        }
        Ok(())
    }
}
