//! Gradient clipping utilities

use crate::engine::Parameter;

/// Clip gradients by global norm
///
/// Computes the global norm of all gradients and scales them down if the
/// norm exceeds `max_norm`, preserving relative magnitudes.
///
/// Algorithm:
/// 1. global_norm = sqrt(sum of all gradient squared norms)
/// 2. If global_norm > max_norm, every gradient is multiplied by
///    max_norm / global_norm
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(params: &mut [&mut dyn Parameter], max_norm: f32) -> f32 {
    let total_norm_sq: f32 = params
        .iter()
        .filter_map(|p| p.grad())
        .map(|grad| grad.iter().map(|&g| g * g).sum::<f32>())
        .sum();

    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad_mut() {
                grad.iter_mut().for_each(|g| *g *= clip_coef);
            }
        }
    }

    global_norm
}
