//! Core Metric trait definition

/// Trait for evaluation metrics over a model output and its target
pub trait Metric<O, Y> {
    /// Compute the metric; `None` skips logging for this step
    fn compute(&self, output: &O, target: &Y) -> Option<f32>;

    /// Log key
    fn name(&self) -> &str;
}
