//! Remote feature toggles.
//!
//! Flags arrive on the subscription channel into a [`FlagStore`] and are
//! turned into UI state by the [`FeatureFlagGate`].

mod gate;
mod store;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::Populated;

pub use gate::{
    ENABLE_LIVE_CHAT, FeatureFlagGate, FlagBinding, ImpressionSink, NAVIGATION_PROMO_LINK,
    NO_FLAGS_STATUS, NoOpImpressionSink, RegionState, UiState, default_bindings,
};
pub use store::FlagStore;

/// A single remote toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, alias = "properties")]
    pub string_properties: HashMap<String, String>,
}

impl FeatureFlag {
    pub fn new(id: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            enabled,
            string_properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.string_properties.insert(name.into(), value.into());
        self
    }

    /// A string property, treating an empty string as absent.
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.string_properties
            .get(name)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

// A delivered flag is data even when disabled.
impl Populated for FeatureFlag {}
