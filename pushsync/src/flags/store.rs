use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use super::FeatureFlag;
use crate::cache::{CachedState, StateSink, SubscriptionCache, ValidityProbe};

/// One [`SubscriptionCache`] per flag id.
///
/// A delivery on the subscription channel is the complete flag set: ids
/// missing from it are dropped, every other id gets its cache replaced.
pub struct FlagStore {
    flags: DashMap<String, SubscriptionCache<FeatureFlag>>,
    updates: watch::Sender<u64>,
}

impl Default for FlagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            flags: DashMap::new(),
            updates,
        }
    }

    /// Cached state for `id`, or the empty state if never delivered.
    pub fn state(&self, id: &str) -> Arc<CachedState<FeatureFlag>> {
        self.flags
            .get(id)
            .map(|cache| cache.read())
            .unwrap_or_else(|| Arc::new(CachedState::empty()))
    }

    /// The flag for `id` if its cache is valid.
    pub fn get(&self, id: &str) -> Option<FeatureFlag> {
        let state = self.state(id);
        if state.is_valid() {
            state.value.clone()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.flags.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Replace the whole flag set.
    pub fn replace_all(&self, flags: Vec<FeatureFlag>, at: DateTime<Utc>) {
        self.flags
            .retain(|id, _| flags.iter().any(|flag| &flag.id == id));

        for flag in flags {
            self.flags
                .entry(flag.id.clone())
                .or_default()
                .write(flag, at);
        }

        self.updates.send_modify(|g| *g = g.wrapping_add(1));
        debug!(flags = self.flags.len(), "Feature flags replaced");
    }

    /// Receiver that changes after every delivery.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }
}

impl ValidityProbe for FlagStore {
    fn is_valid(&self) -> bool {
        self.flags.iter().any(|entry| entry.value().is_valid())
    }
}

impl StateSink<Vec<FeatureFlag>> for FlagStore {
    fn accept(&self, value: Vec<FeatureFlag>, at: DateTime<Utc>) {
        self.replace_all(value, at);
    }
}
