//! Batch sources

use super::Sampler;

/// Something the trainer can iterate for `(input, target)` batches.
///
/// [`DataSource::iter`] is called again every time the previous iterator is
/// exhausted, so each call must start a fresh pass.
pub trait DataSource {
    type Input;
    type Target;
    type Iter: Iterator<Item = (Self::Input, Self::Target)>;

    /// Start a new pass over the data
    fn iter(&mut self) -> Self::Iter;

    /// Number of batches in one pass, if known
    fn len(&self) -> Option<usize> {
        None
    }

    /// Items per batch, if known
    fn batch_size(&self) -> Option<usize> {
        None
    }

    /// Attached sampler, if any
    fn sampler_mut(&mut self) -> Option<&mut dyn Sampler> {
        None
    }

    /// Attach a sampler; returns false when the source cannot be resampled
    fn attach_sampler(&mut self, _sampler: Box<dyn Sampler>) -> bool {
        false
    }
}

/// In-memory list of pre-collated batches.
///
/// A sampler, when attached, reorders and shards whole batches.
pub struct VecDataSource<X, Y> {
    batches: Vec<(X, Y)>,
    batch_size: Option<usize>,
    sampler: Option<Box<dyn Sampler>>,
}

impl<X: Clone, Y: Clone> VecDataSource<X, Y> {
    pub fn new(batches: Vec<(X, Y)>) -> Self {
        Self { batches, batch_size: None, sampler: None }
    }

    /// Declare the per-batch item count
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Attach a sampler at construction
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    pub fn has_sampler(&self) -> bool {
        self.sampler.is_some()
    }
}

impl<X: Clone, Y: Clone> DataSource for VecDataSource<X, Y> {
    type Input = X;
    type Target = Y;
    type Iter = std::vec::IntoIter<(X, Y)>;

    fn iter(&mut self) -> Self::Iter {
        let order = match &self.sampler {
            Some(sampler) => sampler.indices(self.batches.len()),
            None => (0..self.batches.len()).collect(),
        };
        order.into_iter().map(|i| self.batches[i].clone()).collect::<Vec<_>>().into_iter()
    }

    fn len(&self) -> Option<usize> {
        let n = self.batches.len();
        Some(self.sampler.as_ref().map_or(n, |s| s.num_samples(n)))
    }

    fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    fn sampler_mut(&mut self) -> Option<&mut dyn Sampler> {
        self.sampler.as_mut().map(|s| s.as_mut() as &mut dyn Sampler)
    }

    fn attach_sampler(&mut self, sampler: Box<dyn Sampler>) -> bool {
        self.sampler = Some(sampler);
        true
    }
}
