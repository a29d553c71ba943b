//! Per-process rank information for multi-process runs

use crate::{Error, Result};
use log::info;

/// Rank, world size and derived flags for this process.
///
/// Read from the `RANK`, `LOCAL_RANK` and `WORLD_SIZE` environment
/// variables set by the process launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    pub rank: usize,
    pub local_rank: usize,
    pub world_size: usize,
    /// True when `rank` is one of the configured master ranks
    pub master_process: bool,
    /// Seed shared by every rank; shard permutations are drawn from it
    pub base_seed: u64,
    /// Base seed offset by rank
    pub seed: u64,
}

impl ProcessContext {
    /// Read the launcher environment; missing variables mean a single process
    pub fn init(master_ranks: &[usize], seed: u64) -> Result<Self> {
        Self::from_lookup(master_ranks, seed, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(
        master_ranks: &[usize],
        seed: u64,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let read = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| Error::config(format!("{key}={raw} is not a valid integer"))),
                None => Ok(default),
            }
        };
        let rank = read("RANK", 0)?;
        let local_rank = read("LOCAL_RANK", 0)?;
        let world_size = read("WORLD_SIZE", 1)?;
        if world_size == 0 || rank >= world_size {
            return Err(Error::config(format!("rank {rank} outside world of size {world_size}")));
        }

        let ctx = Self {
            rank,
            local_rank,
            world_size,
            master_process: master_ranks.contains(&rank),
            base_seed: seed,
            seed: seed.wrapping_add(rank as u64),
        };
        info!(
            "process rank {}/{} (local {}), master={}",
            ctx.rank, ctx.world_size, ctx.local_rank, ctx.master_process
        );
        Ok(ctx)
    }

    /// Single-process context with rank 0 as master
    pub fn single(seed: u64) -> Self {
        Self { rank: 0, local_rank: 0, world_size: 1, master_process: true, base_seed: seed, seed }
    }
}
