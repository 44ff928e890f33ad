//! Last-known-value cache for remotely synchronized state.
//!
//! A [`SubscriptionCache`] holds one [`CachedState`] that is replaced as a
//! whole on every write. Readers get an `Arc` snapshot and never observe a
//! partially merged value.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

/// Timestamp of a cache that has never been populated.
pub const EPOCH_SENTINEL: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Whether a value carries data worth showing.
///
/// Collections are populated when non-empty; scalar values use the default.
pub trait Populated {
    fn is_populated(&self) -> bool {
        true
    }
}

impl<T> Populated for Vec<T> {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V, S> Populated for HashMap<K, V, S> {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Populated for BTreeMap<K, V> {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }
}

impl Populated for String {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }
}

/// Anything whose validity can be polled.
pub trait ValidityProbe: Send + Sync {
    fn is_valid(&self) -> bool;
}

/// Destination of the out-of-band subscription channel.
pub trait StateSink<T>: Send + Sync + 'static {
    fn accept(&self, value: T, at: DateTime<Utc>);
}

/// A value plus the time it was last written.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedState<T> {
    pub value: Option<T>,
    pub last_updated: DateTime<Utc>,
}

impl<T> Default for CachedState<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> CachedState<T> {
    /// The never-populated state.
    pub fn empty() -> Self {
        Self {
            value: None,
            last_updated: EPOCH_SENTINEL,
        }
    }

    pub fn new(value: T, last_updated: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            last_updated,
        }
    }

    pub fn is_epoch(&self) -> bool {
        self.last_updated == EPOCH_SENTINEL
    }
}

impl<T: Populated> CachedState<T> {
    /// Written at a real time, holds a value, and that value is populated.
    pub fn is_valid(&self) -> bool {
        !self.is_epoch() && self.value.as_ref().is_some_and(Populated::is_populated)
    }
}

/// Shared last-known-value holder.
///
/// Single logical writer, any number of concurrent readers. Each write bumps a
/// generation counter that subscribers can await.
pub struct SubscriptionCache<T> {
    state: Arc<RwLock<Arc<CachedState<T>>>>,
    generation: Arc<watch::Sender<u64>>,
}

impl<T> Clone for SubscriptionCache<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<T> Default for SubscriptionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionCache<T> {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(Arc::new(CachedState::empty()))),
            generation: Arc::new(generation),
        }
    }

    /// Current snapshot.
    pub fn read(&self) -> Arc<CachedState<T>> {
        self.state.read().clone()
    }

    /// Replace the cached value.
    pub fn write(&self, value: T, timestamp: DateTime<Utc>) {
        self.replace(CachedState::new(value, timestamp));
    }

    /// Replace the whole state in one swap.
    pub fn replace(&self, state: CachedState<T>) {
        *self.state.write() = Arc::new(state);
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    /// Number of writes so far.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Receiver that changes after every write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl<T: Populated> SubscriptionCache<T> {
    pub fn is_valid(&self) -> bool {
        self.state.read().is_valid()
    }
}

impl<T: Populated + Send + Sync> ValidityProbe for SubscriptionCache<T> {
    fn is_valid(&self) -> bool {
        SubscriptionCache::is_valid(self)
    }
}

impl<T: Send + Sync + 'static> StateSink<T> for SubscriptionCache<T> {
    fn accept(&self, value: T, at: DateTime<Utc>) {
        self.write(value, at);
    }
}
