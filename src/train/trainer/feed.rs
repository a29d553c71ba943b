//! Batch fetching with one iterator rebuild per exhaustion

use crate::data::DataSource;
use crate::train::callback::CallbackList;
use crate::train::RunState;
use crate::{Error, Result};
use log::debug;

/// Live iterator over a data source for one `fit` call
pub(crate) struct BatchFeed<'a, D: DataSource> {
    data: &'a mut D,
    iter: D::Iter,
}

impl<'a, D: DataSource> BatchFeed<'a, D> {
    /// Seed the sampler for `epoch` and start the first pass
    pub(crate) fn new(data: &'a mut D, epoch: usize) -> Self {
        if let Some(sampler) = data.sampler_mut() {
            sampler.set_epoch(epoch);
        }
        let iter = data.iter();
        Self { data, iter }
    }

    /// Next batch; on exhaustion notify callbacks, re-seed the sampler,
    /// rebuild the iterator and retry once
    pub(crate) fn next_batch(
        &mut self,
        state: &mut RunState,
        callbacks: &mut CallbackList,
    ) -> Result<(D::Input, D::Target)> {
        if let Some(batch) = self.iter.next() {
            state.batch_step += 1;
            return Ok(batch);
        }

        callbacks.on_dataloader_end(state)?;
        if let Some(sampler) = self.data.sampler_mut() {
            sampler.set_epoch(state.epoch);
        }
        self.iter = self.data.iter();
        state.batch_step = 0;
        debug!("data source exhausted at global step {}, iterator rebuilt", state.global_step);

        match self.iter.next() {
            Some(batch) => {
                state.batch_step = 1;
                Ok(batch)
            }
            None => Err(Error::EmptyDataSource { global_step: state.global_step }),
        }
    }
}
