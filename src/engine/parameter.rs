//! Trainable parameter buffers

/// A named trainable buffer with an optional gradient slot.
///
/// Optimizers, gradient clipping and the loss scaler only see parameters
/// through this trait.
pub trait Parameter {
    /// Fully qualified parameter name (state dict key)
    fn name(&self) -> &str;

    /// Logical shape
    fn shape(&self) -> &[usize];

    /// Parameter values
    fn data(&self) -> &[f32];

    /// Mutable parameter values
    fn data_mut(&mut self) -> &mut [f32];

    /// Accumulated gradient, if any backward pass has written one
    fn grad(&self) -> Option<&[f32]>;

    /// Mutable accumulated gradient
    fn grad_mut(&mut self) -> Option<&mut [f32]>;

    /// Add `scale * grad` into the gradient slot, allocating it on first use
    fn accumulate_grad(&mut self, grad: &[f32], scale: f32);

    /// Reset the gradient slot
    fn zero_grad(&mut self);

    /// Whether the optimizer updates this parameter
    fn requires_grad(&self) -> bool {
        true
    }

    /// Number of scalar elements
    fn numel(&self) -> usize {
        self.data().len()
    }
}

/// Plain owned parameter buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    shape: Vec<usize>,
    data: Vec<f32>,
    grad: Option<Vec<f32>>,
    requires_grad: bool,
}

impl Param {
    /// Create a trainable 1-D parameter
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        let shape = vec![data.len()];
        Self { name: name.into(), shape, data, grad: None, requires_grad: true }
    }

    /// Create a parameter with an explicit shape
    pub fn with_shape(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { name: name.into(), shape, data, grad: None, requires_grad: true }
    }

    /// Freeze or unfreeze the parameter
    pub fn requires_grad_(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    /// Set requires_grad in place
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }
}

impl Parameter for Param {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> &[f32] {
        &self.data
    }

    fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    fn grad(&self) -> Option<&[f32]> {
        self.grad.as_deref()
    }

    fn grad_mut(&mut self) -> Option<&mut [f32]> {
        self.grad.as_deref_mut()
    }

    fn accumulate_grad(&mut self, grad: &[f32], scale: f32) {
        if !self.requires_grad {
            return;
        }
        let slot = self.grad.get_or_insert_with(|| vec![0.0; self.data.len()]);
        for (g, &delta) in slot.iter_mut().zip(grad) {
            *g += scale * delta;
        }
    }

    fn zero_grad(&mut self) {
        self.grad = None;
    }

    fn requires_grad(&self) -> bool {
        self.requires_grad
    }
}
