//! Built-in metrics over flat `f32` predictions

use super::Metric;

/// Binary accuracy: fraction where `pred >= threshold` matches `target >= 0.5`
#[derive(Debug, Clone)]
pub struct Accuracy {
    threshold: f32,
}

impl Accuracy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl<O: AsRef<[f32]>, Y: AsRef<[f32]>> Metric<O, Y> for Accuracy {
    fn compute(&self, output: &O, target: &Y) -> Option<f32> {
        let (pred, target) = (output.as_ref(), target.as_ref());
        if pred.is_empty() || pred.len() != target.len() {
            return None;
        }
        let correct = pred
            .iter()
            .zip(target)
            .filter(|(&p, &t)| (p >= self.threshold) == (t >= 0.5))
            .count();
        Some(correct as f32 / pred.len() as f32)
    }

    fn name(&self) -> &str {
        "accuracy"
    }
}

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct MAE;

impl<O: AsRef<[f32]>, Y: AsRef<[f32]>> Metric<O, Y> for MAE {
    fn compute(&self, output: &O, target: &Y) -> Option<f32> {
        let (pred, target) = (output.as_ref(), target.as_ref());
        if pred.is_empty() || pred.len() != target.len() {
            return None;
        }
        let total: f32 = pred.iter().zip(target).map(|(p, t)| (p - t).abs()).sum();
        Some(total / pred.len() as f32)
    }

    fn name(&self) -> &str {
        "mae"
    }
}
