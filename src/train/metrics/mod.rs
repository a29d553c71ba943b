//! Metrics computed on each step's model output
//!
//! - `Metric` - typed metric trait
//! - `Accuracy`, `MAE` - built-ins over flat `f32` outputs
//! - `Metrics` - ordered registry, `loss` always first

mod classification;
mod registry;
mod trait_def;

pub use classification::{Accuracy, MAE};
pub use registry::{MetricFn, MetricSpec, Metrics, MultiMetricFn};
pub use trait_def::Metric;
