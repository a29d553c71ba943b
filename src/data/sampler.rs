//! Index samplers

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Produces the order in which a data source visits its items.
pub trait Sampler: Send {
    /// Indices to visit for a dataset of `len` items
    fn indices(&self, len: usize) -> Vec<usize>;

    /// Number of indices [`Sampler::indices`] yields for `len` items
    fn num_samples(&self, len: usize) -> usize {
        len
    }

    /// Re-seed per-epoch shuffling
    fn set_epoch(&mut self, _epoch: usize) {}

    /// Whether this sampler shards across processes
    fn is_distributed(&self) -> bool {
        false
    }
}

/// Visits every index in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn indices(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }
}

/// Rank-strided shard of the dataset for one process.
///
/// Every rank yields the same number of indices (the tail is padded by
/// wrapping around), so collective operations stay aligned. With shuffling,
/// the permutation is drawn from `seed + epoch` and is identical on all
/// ranks before sharding.
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    num_replicas: usize,
    rank: usize,
    seed: u64,
    epoch: usize,
    shuffle: bool,
}

impl DistributedSampler {
    pub fn new(num_replicas: usize, rank: usize, seed: u64) -> Self {
        Self { num_replicas: num_replicas.max(1), rank, seed, epoch: 0, shuffle: true }
    }

    /// Disable shuffling
    pub fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Sampler for DistributedSampler {
    fn indices(&self, len: usize) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        let mut order: Vec<usize> = (0..len).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch as u64));
            order.shuffle(&mut rng);
        }

        let total = self.num_samples(len) * self.num_replicas;
        let padded = order.iter().copied().cycle().take(total);
        padded.skip(self.rank).step_by(self.num_replicas).collect()
    }

    fn num_samples(&self, len: usize) -> usize {
        len.div_ceil(self.num_replicas)
    }

    fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    fn is_distributed(&self) -> bool {
        true
    }
}
