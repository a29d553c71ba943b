//! Differentiable scalar losses

use super::Parameter;
use crate::Result;

/// A scalar produced by the criterion that can propagate gradients.
pub trait Differentiable {
    /// Scalar value
    fn item(&self) -> f32;

    /// Accumulate `grad_scale * d(self)/d(param)` into every parameter
    fn backward(
        &self,
        params: &mut [&mut dyn Parameter],
        grad_scale: f32,
        retain_graph: bool,
    ) -> Result<()>;
}

impl std::fmt::Debug for dyn Differentiable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Differentiable({})", self.item())
    }
}

/// A loss multiplied by a constant factor.
///
/// Used for `loss / grad_accumulation_steps` and for loss scaling; the
/// factor folds into both the value and the backward seed.
pub struct Scaled<'a> {
    inner: &'a dyn Differentiable,
    factor: f32,
}

impl<'a> Scaled<'a> {
    pub fn new(inner: &'a dyn Differentiable, factor: f32) -> Self {
        Self { inner, factor }
    }
}

impl Differentiable for Scaled<'_> {
    fn item(&self) -> f32 {
        self.inner.item() * self.factor
    }

    fn backward(
        &self,
        params: &mut [&mut dyn Parameter],
        grad_scale: f32,
        retain_graph: bool,
    ) -> Result<()> {
        self.inner.backward(params, grad_scale * self.factor, retain_graph)
    }
}

impl Differentiable for f32 {
    fn item(&self) -> f32 {
        *self
    }

    fn backward(&self, _params: &mut [&mut dyn Parameter], _: f32, _: bool) -> Result<()> {
        Ok(())
    }
}
