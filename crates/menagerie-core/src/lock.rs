//! Keyed reader/writer locking with contention counters.
//!
//! [`ShardedLock`] spreads entries over a power-of-two number of
//! `tokio::sync::RwLock`-guarded maps. The shard is chosen from the low
//! bits of the key, so operations on agents in different shards never
//! wait on each other. Every acquisition first tries the lock without
//! waiting; a failed try counts as contention before the awaited
//! acquisition proceeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use menagerie_types::AgentId;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default shard count.
pub const DEFAULT_SHARDS: usize = 16;

/// Acquisition counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Number of shards.
    pub shards: usize,
    /// Total acquisitions.
    pub acquisitions: u64,
    /// Acquisitions that had to wait.
    pub contended: u64,
}

/// A map from [`AgentId`] to `T`, split into independently locked shards.
#[derive(Debug)]
pub struct ShardedLock<T> {
    shards: Vec<RwLock<HashMap<AgentId, T>>>,
    mask: u64,
    acquisitions: AtomicU64,
    contended: AtomicU64,
}

impl<T> Default for ShardedLock<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<T> ShardedLock<T> {
    /// Create a lock with `shards` rounded up to a power of two.
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let mask = u64::try_from(count).unwrap_or(1).saturating_sub(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
            mask,
            acquisitions: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard holding `id`.
    pub fn shard_index(&self, id: AgentId) -> usize {
        usize::try_from(id.low_bits() & self.mask).unwrap_or(0)
    }

    /// Read guard over the shard holding `id`.
    pub async fn read(&self, id: AgentId) -> RwLockReadGuard<'_, HashMap<AgentId, T>> {
        self.read_shard(self.shard_index(id)).await
    }

    /// Write guard over the shard holding `id`.
    pub async fn write(&self, id: AgentId) -> RwLockWriteGuard<'_, HashMap<AgentId, T>> {
        self.write_shard(self.shard_index(id)).await
    }

    /// Read guard over shard `index`. Out-of-range indices wrap.
    pub async fn read_shard(&self, index: usize) -> RwLockReadGuard<'_, HashMap<AgentId, T>> {
        let shard = self.shard(index);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if let Ok(guard) = shard.try_read() {
            return guard;
        }
        self.contended.fetch_add(1, Ordering::Relaxed);
        shard.read().await
    }

    /// Write guard over shard `index`. Out-of-range indices wrap.
    pub async fn write_shard(&self, index: usize) -> RwLockWriteGuard<'_, HashMap<AgentId, T>> {
        let shard = self.shard(index);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if let Ok(guard) = shard.try_write() {
            return guard;
        }
        self.contended.fetch_add(1, Ordering::Relaxed);
        shard.write().await
    }

    /// Current counters.
    pub fn stats(&self) -> LockStats {
        LockStats {
            shards: self.shards.len(),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }

    #[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
    fn shard(&self, index: usize) -> &RwLock<HashMap<AgentId, T>> {
        // `shards` is never empty and its length is a power of two.
        &self.shards[index & (self.shards.len() - 1)]
    }
}
