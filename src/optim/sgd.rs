//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::engine::Parameter;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SGD optimizer with optional momentum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SGD {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Vec<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self { lr, momentum, velocities: Vec::new() }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [&mut dyn Parameter]) -> Result<()> {
        if self.velocities.len() != params.len() {
            self.velocities = vec![None; params.len()];
        }

        for (param, velocity) in params.iter_mut().zip(self.velocities.iter_mut()) {
            if !param.requires_grad() {
                continue;
            }
            let Some(grad) = param.grad().map(<[f32]>::to_vec) else {
                continue;
            };

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad; param += v
                let v = velocity.get_or_insert_with(|| vec![0.0; grad.len()]);
                for (vi, g) in v.iter_mut().zip(&grad) {
                    *vi = self.momentum * *vi - self.lr * g;
                }
                for (d, vi) in param.data_mut().iter_mut().zip(v.iter()) {
                    *d += vi;
                }
            } else {
                for (d, g) in param.data_mut().iter_mut().zip(&grad) {
                    *d -= self.lr * g;
                }
            }
        }
        Ok(())
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn state_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn load_state_dict(&mut self, state: &Value) -> Result<()> {
        *self = serde_json::from_value(state.clone())?;
        Ok(())
    }
}
