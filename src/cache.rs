//! Coalescing cache for existence outcomes.
//!
//! Memoizes results keyed by canonical reference so repeated checks of the
//! same artifact never reach the network twice within a run. Concurrent
//! requests for one key share a single computation; requests for unrelated
//! keys never wait on each other.
//!
//! ```text
//! get_or_compute(key)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Lock slot table     │  (held only to fetch the per-key slot)
//! └─────────┬───────────┘
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  FILLED       EMPTY
//!    │             │
//!    ▼             ▼
//!  Return     First caller computes,
//!             later callers await the same slot
//! ```

use crate::artifact::CanonicalKey;
use crate::checker::Probe;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Cache statistics for the end-of-run summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from an already filled slot.
    pub hits: u64,
    /// Lookups that joined a computation already in flight.
    pub coalesced: u64,
    /// Computations actually executed.
    pub computations: u64,
}

impl CacheStats {
    /// Total number of lookups.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.hits + self.coalesced + self.computations
    }

    /// Calculate the share of lookups that avoided a computation, as a percentage.
    #[must_use]
    pub fn saved_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = ((self.hits + self.coalesced) as f64 / total as f64) * 100.0;
            rate
        }
    }
}

/// Write-once, per-key coalescing cache.
///
/// Every key owns a slot that is filled at most once. The slot table lock is
/// never held across an `.await`.
pub struct CoalescingCache<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
    stats: Mutex<CacheStats>,
}

/// Cache of existence outcomes keyed by canonical reference.
pub type ExistenceCache = CoalescingCache<CanonicalKey, Probe>;

impl<K, V> CoalescingCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Return the cached value for `key`, computing it with `compute` if absent.
    ///
    /// `compute` runs at most once per key even under concurrent callers; all
    /// callers observe the same value. If the computing caller is cancelled
    /// before finishing, one of the remaining waiters takes over.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key).or_default())
        };

        if let Some(value) = slot.get() {
            self.stats.lock().hits += 1;
            return value.clone();
        }

        let mut computed = false;
        let value = slot
            .get_or_init(|| {
                computed = true;
                compute()
            })
            .await
            .clone();

        let mut stats = self.stats.lock();
        if computed {
            stats.computations += 1;
        } else {
            stats.coalesced += 1;
        }
        value
    }

    /// Return the value for `key` if it has been computed.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.slots.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Number of keys with a filled slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Check if no value has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for CoalescingCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
