//! Applies cached flags to UI-facing state.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{FeatureFlag, FlagStore};
use crate::event_log::{EventLog, LogCategory};
use crate::refresh::{RefreshKind, RefreshOrchestrator, RefreshOutcome};

pub const NAVIGATION_PROMO_LINK: &str = "navigation_promo_link";
pub const ENABLE_LIVE_CHAT: &str = "enable_live_chat";

/// Status line when no binding produced a status.
pub const NO_FLAGS_STATUS: &str = "No feature flags received yet.";

/// Receives one call per enabled flag per `apply()`.
pub trait ImpressionSink: Send + Sync {
    fn log_impression(&self, flag_id: &str);
}

/// Discards impressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpImpressionSink;

impl ImpressionSink for NoOpImpressionSink {
    fn log_impression(&self, _flag_id: &str) {}
}

/// How one flag drives one UI region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlagBinding {
    /// Region shown iff the flag is enabled.
    Toggle {
        flag_id: String,
        region: String,
        label: String,
    },
    /// Region shown iff the flag is enabled and both text and link resolve.
    Link {
        flag_id: String,
        region: String,
        label: String,
        text_property: String,
        link_property: String,
        default_text: String,
        default_link: String,
    },
}

impl FlagBinding {
    pub fn toggle(
        flag_id: impl Into<String>,
        region: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self::Toggle {
            flag_id: flag_id.into(),
            region: region.into(),
            label: label.into(),
        }
    }

    pub fn link(
        flag_id: impl Into<String>,
        region: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self::Link {
            flag_id: flag_id.into(),
            region: region.into(),
            label: label.into(),
            text_property: "text".to_string(),
            link_property: "link".to_string(),
            default_text: "Promo".to_string(),
            default_link: "#".to_string(),
        }
    }

    pub fn flag_id(&self) -> &str {
        match self {
            Self::Toggle { flag_id, .. } | Self::Link { flag_id, .. } => flag_id,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            Self::Toggle { region, .. } | Self::Link { region, .. } => region,
        }
    }

    /// Region state and status fragment for `flag`.
    fn evaluate(&self, flag: Option<&FeatureFlag>) -> (RegionState, String) {
        let enabled = flag.is_some_and(|f| f.enabled);
        match self {
            Self::Toggle { label, .. } => {
                let state = RegionState {
                    visible: enabled,
                    ..RegionState::default()
                };
                let status = format!("{label}: {}", if enabled { "on" } else { "off" });
                (state, status)
            }
            Self::Link {
                label,
                text_property,
                link_property,
                default_text,
                default_link,
                ..
            } => {
                let text = flag
                    .map(|f| {
                        f.string_property(text_property)
                            .unwrap_or(default_text.as_str())
                            .to_string()
                    })
                    .unwrap_or_default();
                let link = flag
                    .and_then(|f| f.string_property(link_property))
                    .unwrap_or(default_link.as_str())
                    .to_string();

                if enabled && !text.is_empty() && !link.is_empty() {
                    let status = format!("{label}: \"{text}\" -> {link}");
                    let state = RegionState {
                        visible: true,
                        text: Some(text),
                        link: Some(link),
                    };
                    (state, status)
                } else if enabled {
                    (RegionState::default(), format!("{label}: on but missing text/link"))
                } else {
                    (RegionState::default(), format!("{label}: off"))
                }
            }
        }
    }
}

/// The bindings used when none are configured.
pub fn default_bindings() -> Vec<FlagBinding> {
    vec![
        FlagBinding::link(NAVIGATION_PROMO_LINK, "promo_banner", "Promo"),
        FlagBinding::toggle(ENABLE_LIVE_CHAT, "live_chat", "Live Chat"),
    ]
}

/// Derived state of one UI region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionState {
    pub visible: bool,
    pub text: Option<String>,
    pub link: Option<String>,
}

/// Everything flags control in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiState {
    pub regions: BTreeMap<String, RegionState>,
    pub status: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            regions: BTreeMap::new(),
            status: NO_FLAGS_STATUS.to_string(),
        }
    }
}

impl UiState {
    pub fn region(&self, name: &str) -> Option<&RegionState> {
        self.regions.get(name)
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.region(name).is_some_and(|r| r.visible)
    }
}

/// Turns cached flags into [`UiState`].
pub struct FeatureFlagGate {
    store: Arc<FlagStore>,
    orchestrator: Arc<RefreshOrchestrator>,
    bindings: Vec<FlagBinding>,
    impressions: Arc<dyn ImpressionSink>,
    ui: RwLock<UiState>,
    log: EventLog,
}

impl FeatureFlagGate {
    pub fn new(
        store: Arc<FlagStore>,
        orchestrator: Arc<RefreshOrchestrator>,
        impressions: Arc<dyn ImpressionSink>,
        log: EventLog,
    ) -> Self {
        Self {
            store,
            orchestrator,
            bindings: default_bindings(),
            impressions,
            ui: RwLock::new(UiState::default()),
            log,
        }
    }

    pub fn with_bindings(mut self, bindings: Vec<FlagBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Last state produced by [`apply`](Self::apply).
    pub fn ui_state(&self) -> UiState {
        self.ui.read().clone()
    }

    /// Recompute UI state from the cache.
    ///
    /// Fires one impression for every enabled flag whose region ends up
    /// visible, on every call.
    pub fn apply(&self) -> UiState {
        let mut regions = BTreeMap::new();
        let mut statuses = Vec::with_capacity(self.bindings.len());
        let mut details = serde_json::Map::new();

        for binding in &self.bindings {
            let flag = self.store.get(binding.flag_id());
            let (region, status) = binding.evaluate(flag.as_ref());

            if region.visible {
                self.impressions.log_impression(binding.flag_id());
                debug!(flag = binding.flag_id(), "Feature flag impression");
            }

            details.insert(
                binding.flag_id().to_string(),
                flag.as_ref().map_or(Value::Null, |f| {
                    json!({ "enabled": f.enabled, "properties": f.string_properties })
                }),
            );
            regions.insert(binding.region().to_string(), region);
            statuses.push(status);
        }

        let status = if statuses.is_empty() {
            NO_FLAGS_STATUS.to_string()
        } else {
            statuses.join(" | ")
        };

        let state = UiState { regions, status };
        *self.ui.write() = state.clone();

        let mut payload = json!({ "message": "Feature flags applied" });
        if let Value::Object(map) = &mut payload {
            map.extend(details);
        }
        self.log.append(LogCategory::System, payload);

        state
    }

    /// Request fresh flags, then apply whatever is cached.
    ///
    /// On ack failure the UI is rebuilt from the last cached flags, so it
    /// never falls back to an empty state.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.log
            .message(LogCategory::System, "Refreshing feature flags");

        let outcome = self
            .orchestrator
            .request_refresh(RefreshKind::FeatureFlags)
            .await;
        self.apply();

        match &outcome {
            RefreshOutcome::Updated { .. } => {
                self.log
                    .message(LogCategory::System, "Feature flags refreshed successfully");
            }
            RefreshOutcome::NoData { .. } => {}
            RefreshOutcome::AckFailed(failure) => {
                info!(error = %failure, "Showing cached feature flags");
                self.log.append(
                    LogCategory::System,
                    json!({
                        "message": "Feature flags server refresh failed; showing cached values.",
                        "detail": failure.to_string(),
                    }),
                );
            }
        }

        outcome
    }

    /// Re-run [`apply`](Self::apply) after every delivery to the store.
    pub fn spawn_auto_apply(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let mut updates = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.apply();
                    }
                }
            }
            debug!("Feature flag auto-apply stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AckFailure;
    use crate::refresh::{BoundedPoll, RemoteStateSource};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<String>>,
    }

    impl ImpressionSink for RecordingSink {
        fn log_impression(&self, flag_id: &str) {
            self.seen.lock().push(flag_id.to_string());
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RemoteStateSource for FailingSource {
        async fn request_refresh(&self, _kind: RefreshKind) -> Result<(), AckFailure> {
            Err(AckFailure::RateLimited)
        }
    }

    fn create_test_gate() -> (Arc<FeatureFlagGate>, Arc<FlagStore>, Arc<RecordingSink>) {
        let log = EventLog::new();
        let store = Arc::new(FlagStore::new());
        let orchestrator = Arc::new(
            RefreshOrchestrator::new(Arc::new(FailingSource), BoundedPoll::default(), log.clone())
                .with_target(RefreshKind::FeatureFlags, store.clone()),
        );
        let sink = Arc::new(RecordingSink::default());
        let gate = Arc::new(FeatureFlagGate::new(
            store.clone(),
            orchestrator,
            sink.clone(),
            log,
        ));
        (gate, store, sink)
    }

    #[test]
    fn test_no_flags_status() {
        let (gate, _, sink) = create_test_gate();
        let state = gate.apply();
        assert_eq!(state.status, "Promo: off | Live Chat: off");
        assert!(!state.is_visible("promo_banner"));
        assert!(!state.is_visible("live_chat"));
        assert!(sink.seen.lock().is_empty());
    }

    #[test]
    fn test_no_bindings_status() {
        let (gate, _, _) = create_test_gate();
        let gate = Arc::try_unwrap(gate).ok().unwrap().with_bindings(Vec::new());
        let state = gate.apply();
        assert_eq!(state.status, NO_FLAGS_STATUS);
        assert!(state.regions.is_empty());
    }

    #[test]
    fn test_promo_link_uses_properties() {
        let (gate, store, sink) = create_test_gate();
        store.replace_all(
            vec![
                FeatureFlag::new(NAVIGATION_PROMO_LINK, true)
                    .with_property("text", "Summer sale")
                    .with_property("link", "https://x/sale"),
                FeatureFlag::new(ENABLE_LIVE_CHAT, false),
            ],
            Utc::now(),
        );

        let state = gate.apply();
        let promo = state.region("promo_banner").unwrap();
        assert!(promo.visible);
        assert_eq!(promo.text.as_deref(), Some("Summer sale"));
        assert_eq!(promo.link.as_deref(), Some("https://x/sale"));
        assert!(!state.is_visible("live_chat"));
        assert_eq!(
            state.status,
            "Promo: \"Summer sale\" -> https://x/sale | Live Chat: off"
        );
        assert_eq!(*sink.seen.lock(), vec![NAVIGATION_PROMO_LINK.to_string()]);
    }

    #[test]
    fn test_promo_link_defaults() {
        let (gate, store, _) = create_test_gate();
        store.replace_all(vec![FeatureFlag::new(NAVIGATION_PROMO_LINK, true)], Utc::now());

        let promo = gate.apply().region("promo_banner").cloned().unwrap();
        assert_eq!(promo.text.as_deref(), Some("Promo"));
        assert_eq!(promo.link.as_deref(), Some("#"));
    }

    #[test]
    fn test_impressions_fire_on_every_apply() {
        let (gate, store, sink) = create_test_gate();
        store.replace_all(vec![FeatureFlag::new(ENABLE_LIVE_CHAT, true)], Utc::now());

        gate.apply();
        gate.apply();
        gate.apply();
        assert_eq!(sink.seen.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_ui_state() {
        let (gate, store, _) = create_test_gate();
        store.replace_all(vec![FeatureFlag::new(ENABLE_LIVE_CHAT, true)], Utc::now());
        let before = gate.apply();

        let outcome = gate.refresh().await;

        assert!(outcome.is_ack_failure());
        assert_eq!(gate.ui_state(), before);
        assert!(gate.ui_state().is_visible("live_chat"));
    }

    #[tokio::test]
    async fn test_auto_apply_on_delivery() {
        let (gate, store, _) = create_test_gate();
        let token = CancellationToken::new();
        let task = gate.clone().spawn_auto_apply(token.clone());

        store.replace_all(vec![FeatureFlag::new(ENABLE_LIVE_CHAT, true)], Utc::now());
        for _ in 0..50 {
            if gate.ui_state().is_visible("live_chat") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(gate.ui_state().is_visible("live_chat"));

        token.cancel();
        task.await.unwrap();
    }
}
