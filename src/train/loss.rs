//! Criterion outputs and their normalization into a primary loss plus
//! loss-detail values

use crate::engine::Differentiable;
use crate::{Error, Result};

/// Criterion callable: `(model_output, target) -> LossOutput`
pub type Criterion<O, Y> = Box<dyn Fn(&O, &Y) -> Result<LossOutput>>;

/// One term of a composite loss
pub enum LossTerm {
    /// Differentiable value
    Tensor(Box<dyn Differentiable>),
    /// Plain number, logged only
    Value(f32),
}

impl LossTerm {
    pub fn item(&self) -> f32 {
        match self {
            LossTerm::Tensor(t) => t.item(),
            LossTerm::Value(v) => *v,
        }
    }

    fn into_differentiable(self, what: &str) -> Result<Box<dyn Differentiable>> {
        match self {
            LossTerm::Tensor(t) => Ok(t),
            LossTerm::Value(v) => Err(Error::UnsupportedLoss(format!(
                "{what} is a plain number ({v}) and cannot be backpropagated"
            ))),
        }
    }
}

impl std::fmt::Debug for LossTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LossTerm::Tensor(t) => f.debug_tuple("Tensor").field(&t.item()).finish(),
            LossTerm::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

/// The shapes a criterion may return
#[derive(Debug)]
pub enum LossOutput {
    /// Bare scalar loss
    Scalar(Box<dyn Differentiable>),
    /// Named terms; `"loss"` is the primary one, the rest are details
    Mapping(Vec<(String, LossTerm)>),
    /// Primary loss first, details reported as `loss1`, `loss2`, ...
    Sequence(Vec<LossTerm>),
}

/// Primary loss and its detail values
pub struct NormalizedLoss {
    pub loss: Box<dyn Differentiable>,
    pub details: Vec<(String, f32)>,
}

impl LossOutput {
    pub fn scalar(loss: impl Differentiable + 'static) -> Self {
        LossOutput::Scalar(Box::new(loss))
    }

    /// Split into the primary loss and detail values
    pub fn normalize(self) -> Result<NormalizedLoss> {
        match self {
            LossOutput::Scalar(loss) => Ok(NormalizedLoss { loss, details: Vec::new() }),
            LossOutput::Mapping(terms) => {
                let mut primary = None;
                let mut details = Vec::with_capacity(terms.len().saturating_sub(1));
                for (name, term) in terms {
                    if name == "loss" {
                        primary = Some(term.into_differentiable("mapping entry 'loss'")?);
                    } else {
                        details.push((name, term.item()));
                    }
                }
                let loss = primary.ok_or_else(|| {
                    Error::UnsupportedLoss("mapping has no 'loss' entry".to_string())
                })?;
                Ok(NormalizedLoss { loss, details })
            }
            LossOutput::Sequence(terms) => {
                let mut terms = terms.into_iter();
                let first = terms
                    .next()
                    .ok_or_else(|| Error::UnsupportedLoss("empty loss sequence".to_string()))?;
                let loss = first.into_differentiable("first sequence element")?;
                let details =
                    terms.enumerate().map(|(i, t)| (format!("loss{}", i + 1), t.item())).collect();
                Ok(NormalizedLoss { loss, details })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(v: f32) -> LossTerm {
        LossTerm::Tensor(Box::new(v))
    }

    #[test]
    fn test_scalar_has_no_details() {
        let n = LossOutput::scalar(2.5f32).normalize().unwrap();
        assert_eq!(n.loss.item(), 2.5);
        assert!(n.details.is_empty());
    }

    #[test]
    fn test_mapping_extracts_loss_key() {
        let out = LossOutput::Mapping(vec![
            ("mlm".to_string(), tensor(1.0)),
            ("loss".to_string(), tensor(3.0)),
            ("acc".to_string(), LossTerm::Value(0.5)),
        ]);
        let n = out.normalize().unwrap();
        assert_eq!(n.loss.item(), 3.0);
        assert_eq!(n.details, vec![("mlm".to_string(), 1.0), ("acc".to_string(), 0.5)]);
    }

    #[test]
    fn test_mapping_without_loss_is_rejected() {
        let out = LossOutput::Mapping(vec![("mlm".to_string(), tensor(1.0))]);
        assert!(matches!(out.normalize(), Err(Error::UnsupportedLoss(_))));
    }

    #[test]
    fn test_sequence_details_indexed_from_one() {
        let out = LossOutput::Sequence(vec![tensor(3.0), tensor(1.0), LossTerm::Value(2.0)]);
        let n = out.normalize().unwrap();
        assert_eq!(n.loss.item(), 3.0);
        let names: Vec<_> = n.details.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["loss1", "loss2"]);
    }

    #[test]
    fn test_non_differentiable_primary_is_rejected() {
        let out = LossOutput::Sequence(vec![LossTerm::Value(1.0)]);
        assert!(matches!(out.normalize(), Err(Error::UnsupportedLoss(_))));
        assert!(LossOutput::Sequence(Vec::new()).normalize().is_err());
    }
}
