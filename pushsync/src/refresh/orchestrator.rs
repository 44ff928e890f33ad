//! Refresh orchestration.
//!
//! A refresh touches two decoupled channels:
//!
//! - the **acknowledgment channel** ([`RemoteStateSource::request_refresh`])
//!   answers immediately whether the request was accepted;
//! - the **subscription channel** (see [`super::subscription`]) delivers the
//!   actual state later, straight into a cache.
//!
//! An accepted request therefore says nothing about new data. After a
//! successful ack the orchestrator polls the target's validity with a
//! [`BoundedPoll`] and reports [`RefreshOutcome::NoData`] if nothing shows up.
//! A refused request never touches the cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::backoff::{BoundedPoll, PollOutcome};
use crate::cache::ValidityProbe;
use crate::error::AckFailure;
use crate::event_log::{EventLog, LogCategory};

/// Which piece of remote state to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshKind {
    ContentFeed,
    FeatureFlags,
}

impl fmt::Display for RefreshKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentFeed => f.write_str("content_feed"),
            Self::FeatureFlags => f.write_str("feature_flags"),
        }
    }
}

/// The remote state service's acknowledgment channel.
#[async_trait]
pub trait RemoteStateSource: Send + Sync + 'static {
    /// Ask the remote service to push fresh state for `kind`.
    ///
    /// `Ok` only means the request was accepted.
    async fn request_refresh(&self, kind: RefreshKind) -> Result<(), AckFailure>;
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The target became valid during polling.
    Updated { attempts: usize },
    /// The ack succeeded but no valid data arrived before the poll ran out.
    NoData { attempts: usize },
    /// The remote refused the request; the cache was left untouched.
    AckFailed(AckFailure),
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    pub fn is_ack_failure(&self) -> bool {
        matches!(self, Self::AckFailed(_))
    }
}

/// Issues refresh requests and reconciles them with cached state.
pub struct RefreshOrchestrator {
    source: Arc<dyn RemoteStateSource>,
    targets: HashMap<RefreshKind, Arc<dyn ValidityProbe>>,
    poll: BoundedPoll,
    log: EventLog,
}

impl RefreshOrchestrator {
    pub fn new(source: Arc<dyn RemoteStateSource>, poll: BoundedPoll, log: EventLog) -> Self {
        Self {
            source,
            targets: HashMap::new(),
            poll,
            log,
        }
    }

    /// Register the cache whose validity is polled for `kind`.
    pub fn with_target(mut self, kind: RefreshKind, target: Arc<dyn ValidityProbe>) -> Self {
        self.targets.insert(kind, target);
        self
    }

    /// Send a request on the ack channel without polling afterwards.
    pub async fn request_only(&self, kind: RefreshKind) -> Result<(), AckFailure> {
        let result = self.source.request_refresh(kind).await;
        match &result {
            Ok(()) => {
                debug!(%kind, "Refresh request acknowledged");
                self.log.append(
                    LogCategory::Refresh,
                    json!({
                        "message": format!("{kind} refresh request sent"),
                        "note": "State will arrive via the subscription channel when available",
                    }),
                );
            }
            Err(e) => self.log_ack_failure(kind, e),
        }
        result
    }

    /// Request a refresh and wait, bounded, for valid data.
    ///
    /// Never fails: every outcome is reported as a [`RefreshOutcome`] and
    /// logged.
    pub async fn request_refresh(&self, kind: RefreshKind) -> RefreshOutcome {
        let Some(target) = self.targets.get(&kind).cloned() else {
            warn!(%kind, "No refresh target registered");
            let failure = AckFailure::FeatureDisabled;
            self.log_ack_failure(kind, &failure);
            return RefreshOutcome::AckFailed(failure);
        };

        info!(%kind, "Requesting refresh");
        if let Err(failure) = self.source.request_refresh(kind).await {
            self.log_ack_failure(kind, &failure);
            return RefreshOutcome::AckFailed(failure);
        }

        self.log.append(
            LogCategory::Refresh,
            json!({
                "message": format!("{kind} refresh request sent successfully"),
                "note": "Waiting for data on the subscription channel",
            }),
        );

        let outcome = self
            .poll
            .run(|attempt| {
                let valid = target.is_valid();
                debug!(%kind, attempt, valid, "Checking for refreshed state");
                valid
            })
            .await;

        match outcome {
            PollOutcome::Satisfied { attempts, elapsed } => {
                info!(%kind, attempts, elapsed_ms = elapsed.as_millis() as u64, "Refreshed state received");
                self.log.append(
                    LogCategory::Refresh,
                    json!({
                        "message": format!("{kind} data received"),
                        "attempts": attempts,
                    }),
                );
                RefreshOutcome::Updated { attempts }
            }
            PollOutcome::Exhausted { attempts, .. } => {
                info!(%kind, attempts, "No data received after all checks");
                self.log.append(
                    LogCategory::System,
                    json!({
                        "message": format!("No {kind} data received"),
                        "attempts": attempts,
                    }),
                );
                RefreshOutcome::NoData { attempts }
            }
        }
    }

    fn log_ack_failure(&self, kind: RefreshKind, failure: &AckFailure) {
        warn!(%kind, error = %failure, "Refresh request failed, keeping cached state");
        self.log.append(
            LogCategory::Error,
            json!({
                "message": format!("{kind} refresh request failed"),
                "detail": failure.to_string(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SubscriptionCache;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        result: Result<(), AckFailure>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStateSource for ScriptedSource {
        async fn request_refresh(&self, _kind: RefreshKind) -> Result<(), AckFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    /// Counts validity checks on top of a real cache.
    struct CountingProbe {
        cache: SubscriptionCache<Vec<u32>>,
        checks: AtomicUsize,
    }

    impl ValidityProbe for CountingProbe {
        fn is_valid(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.cache.is_valid()
        }
    }

    fn orchestrator(
        result: Result<(), AckFailure>,
        probe: Arc<CountingProbe>,
    ) -> (RefreshOrchestrator, Arc<ScriptedSource>, EventLog) {
        let source = Arc::new(ScriptedSource {
            result,
            calls: AtomicUsize::new(0),
        });
        let log = EventLog::new();
        let orchestrator = RefreshOrchestrator::new(source.clone(), BoundedPoll::default(), log.clone())
            .with_target(RefreshKind::ContentFeed, probe);
        (orchestrator, source, log)
    }

    fn probe() -> Arc<CountingProbe> {
        Arc::new(CountingProbe {
            cache: SubscriptionCache::new(),
            checks: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_after_bounded_checks() {
        let probe = probe();
        let (orchestrator, _, log) = orchestrator(Ok(()), probe.clone());

        let outcome = orchestrator.request_refresh(RefreshKind::ContentFeed).await;

        assert_eq!(outcome, RefreshOutcome::NoData { attempts: 4 });
        assert_eq!(probe.checks.load(Ordering::SeqCst), 4);
        assert!(probe.cache.read().is_epoch());
        let no_data: Vec<_> = log
            .snapshot()
            .into_iter()
            .filter(|e| e.message() == Some("No content_feed data received"))
            .collect();
        assert_eq!(no_data.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updated_when_subscription_delivers() {
        let probe = probe();
        let (orchestrator, _, _) = orchestrator(Ok(()), probe.clone());

        let writer = probe.cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
            writer.write(vec![7], Utc::now());
        });

        let outcome = orchestrator.request_refresh(RefreshKind::ContentFeed).await;
        assert_eq!(outcome, RefreshOutcome::Updated { attempts: 2 });
        assert_eq!(probe.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_failure_keeps_cache_and_skips_polling() {
        let probe = probe();
        let stamp = Utc::now();
        probe.cache.write(vec![1, 2], stamp);
        let (orchestrator, source, log) = orchestrator(Err(AckFailure::RateLimited), probe.clone());

        let outcome = orchestrator.request_refresh(RefreshKind::ContentFeed).await;

        assert_eq!(outcome, RefreshOutcome::AckFailed(AckFailure::RateLimited));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.checks.load(Ordering::SeqCst), 0);
        let state = probe.cache.read();
        assert_eq!(state.value.as_deref(), Some(&[1, 2][..]));
        assert_eq!(state.last_updated, stamp);
        assert_eq!(log.entries_in(LogCategory::Error).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_kind_is_reported() {
        let probe = probe();
        let (orchestrator, source, _) = orchestrator(Ok(()), probe);

        let outcome = orchestrator.request_refresh(RefreshKind::FeatureFlags).await;

        assert!(outcome.is_ack_failure());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_only_does_not_poll() {
        let probe = probe();
        let (orchestrator, source, log) = orchestrator(Ok(()), probe.clone());

        orchestrator
            .request_only(RefreshKind::ContentFeed)
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.checks.load(Ordering::SeqCst), 0);
        assert_eq!(log.entries_in(LogCategory::Refresh).len(), 1);
    }
}
