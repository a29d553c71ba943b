//! Data source collaborators
//!
//! Batching and collation live outside the trainer: a data source yields
//! ready `(input, target)` batches and may expose a re-seedable sampler.

mod sampler;
mod source;

pub use sampler::{DistributedSampler, Sampler, SequentialSampler};
pub use source::{DataSource, VecDataSource};
