//! Session coordinator.
//!
//! A [`Session`] is the one context object of a foreground client instance.
//! It owns the caches, the refresh machinery, the current user and the
//! readiness flag, and bounds every background task it spawns with a single
//! [`CancellationToken`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::SubscriptionCache;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event_log::{EventLog, LogCategory};
use crate::feed::{ContentFeed, FeedConsumer, FeedStatus};
use crate::flags::{FeatureFlag, FeatureFlagGate, FlagStore, ImpressionSink, UiState};
use crate::refresh::{
    DEFAULT_SUBSCRIPTION_CAPACITY, RefreshKind, RefreshOrchestrator, RefreshOutcome,
    RemoteStateSource, SubscriptionReceiver, SubscriptionSender, subscription_channel,
};

type PendingReceivers = (
    SubscriptionReceiver<ContentFeed>,
    SubscriptionReceiver<Vec<FeatureFlag>>,
);

/// Foreground state of one client instance.
pub struct Session {
    config: EngineConfig,
    log: EventLog,
    feed: Arc<SubscriptionCache<ContentFeed>>,
    flags: Arc<FlagStore>,
    orchestrator: Arc<RefreshOrchestrator>,
    gate: Arc<FeatureFlagGate>,
    consumer: Arc<FeedConsumer>,
    user: Arc<RwLock<Option<String>>>,
    ready: AtomicBool,
    cancellation_token: CancellationToken,
    feed_sender: SubscriptionSender<ContentFeed>,
    flag_sender: SubscriptionSender<Vec<FeatureFlag>>,
    receivers: Mutex<Option<PendingReceivers>>,
    pumps: Mutex<Vec<JoinHandle<u64>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteStateSource>,
        impressions: Arc<dyn ImpressionSink>,
    ) -> Result<Self> {
        config.validate()?;
        info!("Initializing session");

        let log = EventLog::with_capacity(config.event_log_capacity);
        let feed = Arc::new(SubscriptionCache::<ContentFeed>::new());
        let flags = Arc::new(FlagStore::new());

        let orchestrator = Arc::new(
            RefreshOrchestrator::new(remote, config.poll(), log.clone())
                .with_target(RefreshKind::ContentFeed, feed.clone())
                .with_target(RefreshKind::FeatureFlags, flags.clone()),
        );
        let gate = Arc::new(
            FeatureFlagGate::new(flags.clone(), orchestrator.clone(), impressions, log.clone())
                .with_bindings(config.flag_bindings.clone()),
        );
        let consumer = Arc::new(FeedConsumer::new(log.clone()));

        let (feed_sender, feed_receiver) = subscription_channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        let (flag_sender, flag_receiver) = subscription_channel(DEFAULT_SUBSCRIPTION_CAPACITY);

        Ok(Self {
            config,
            log,
            feed,
            flags,
            orchestrator,
            gate,
            consumer,
            user: Arc::new(RwLock::new(None)),
            ready: AtomicBool::new(false),
            cancellation_token: CancellationToken::new(),
            feed_sender,
            flag_sender,
            receivers: Mutex::new(Some((feed_receiver, flag_receiver))),
            pumps: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the subscription pumps, apply cached flags and subscribe to the
    /// content feed.
    ///
    /// A second call is a no-op. Fails once the session has been shut down.
    pub async fn start(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::not_ready("session has been shut down"));
        }
        let Some((feed_receiver, flag_receiver)) = self.receivers.lock().take() else {
            debug!("Session already started");
            return Ok(());
        };

        {
            let mut pumps = self.pumps.lock();
            pumps.push(feed_receiver.spawn_pump(
                "content_feed",
                self.feed.clone(),
                self.cancellation_token.child_token(),
            ));
            pumps.push(flag_receiver.spawn_pump(
                "feature_flags",
                self.flags.clone(),
                self.cancellation_token.child_token(),
            ));
        }

        {
            let mut tasks = self.tasks.lock();
            tasks.push(
                self.gate
                    .clone()
                    .spawn_auto_apply(self.cancellation_token.child_token()),
            );
            tasks.push(self.spawn_feed_watcher());
        }

        self.ready.store(true, Ordering::Release);
        self.log.message(LogCategory::System, "Session ready");
        info!("Session started");

        self.gate.apply();
        self.subscribe_feed().await;
        Ok(())
    }

    /// Consume every feed delivery as it lands in the cache.
    fn spawn_feed_watcher(&self) -> JoinHandle<()> {
        let mut updates = self.feed.subscribe();
        let feed = self.feed.clone();
        let consumer = self.consumer.clone();
        let user = self.user.clone();
        let token = self.cancellation_token.child_token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = feed.read();
                        let user = user.read().clone();
                        consumer.handle_update(&snapshot, user.as_deref());
                    }
                }
            }
            debug!("Content feed watcher stopped");
        })
    }

    /// Initial feed step: use what is cached, or ask for it on the ack
    /// channel and let the subscription deliver it.
    async fn subscribe_feed(&self) {
        if self.feed.is_valid() {
            let user = self.user();
            self.consumer.handle_update(&self.feed.read(), user.as_deref());
            return;
        }

        match self.user() {
            Some(user) => {
                debug!(user = %user, "No cached content feed, requesting one");
                // Failures are logged by the orchestrator; the cache stays as is.
                let _ = self.orchestrator.request_only(RefreshKind::ContentFeed).await;
            }
            None => {
                self.log.message(
                    LogCategory::System,
                    "Content feed subscribed; waiting for an identified user",
                );
            }
        }
    }

    /// Set or clear the current user.
    ///
    /// Identifying a user re-arms a content feed refresh after
    /// `identify_refresh_delay_ms`; the outcome is returned once it completes.
    /// Nothing is refreshed before [`start`](Self::start), for an anonymous
    /// user, or when the session shuts down during the delay.
    pub async fn identify(&self, user: Option<&str>) -> Option<RefreshOutcome> {
        let Some(user) = user.map(str::trim).filter(|u| !u.is_empty()) else {
            let previous = self.user.write().take();
            info!(previous = ?previous, "User cleared");
            self.log.append(
                LogCategory::User,
                json!({ "message": "User cleared; continuing anonymously", "previous": previous }),
            );
            return None;
        };

        *self.user.write() = Some(user.to_string());
        info!(user = %user, "User identified");
        self.log.append(
            LogCategory::User,
            json!({ "message": "User identified", "user_id": user }),
        );

        if !self.is_ready() {
            return None;
        }

        tokio::select! {
            biased;

            _ = self.cancellation_token.cancelled() => return None,
            _ = tokio::time::sleep(self.config.identify_refresh_delay()) => {}
        }

        self.log
            .message(LogCategory::System, "User changed, refreshing content feed...");
        Some(
            self.orchestrator
                .request_refresh(RefreshKind::ContentFeed)
                .await,
        )
    }

    /// Request a fresh content feed.
    ///
    /// When the request is not acknowledged the cached feed is handed to the
    /// consumer again, so the UI keeps showing it.
    pub async fn refresh_feed(&self) -> Result<RefreshOutcome> {
        self.ensure_ready()?;

        let user = self.user();
        if user.is_none() {
            warn!("Refreshing content feed for an anonymous user");
            self.log.append(
                LogCategory::System,
                json!({
                    "message": "No user identified; the content feed may be empty",
                    "level": "warn",
                }),
            );
        }

        let outcome = self
            .orchestrator
            .request_refresh(RefreshKind::ContentFeed)
            .await;
        if outcome.is_ack_failure() {
            debug!("Re-applying cached content feed");
            self.consumer.handle_update(&self.feed.read(), user.as_deref());
        }
        Ok(outcome)
    }

    pub async fn refresh_flags(&self) -> Result<RefreshOutcome> {
        self.ensure_ready()?;
        Ok(self.gate.refresh().await)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::not_ready("session has not been started"))
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn user(&self) -> Option<String> {
        self.user.read().clone()
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.consumer.status()
    }

    pub fn ui_state(&self) -> UiState {
        self.gate.ui_state()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn feed_cache(&self) -> &SubscriptionCache<ContentFeed> {
        &self.feed
    }

    pub fn flag_store(&self) -> &FlagStore {
        &self.flags
    }

    pub fn gate(&self) -> &FeatureFlagGate {
        &self.gate
    }

    /// Remote-facing end of the content feed subscription.
    pub fn feed_sender(&self) -> SubscriptionSender<ContentFeed> {
        self.feed_sender.clone()
    }

    /// Remote-facing end of the feature flag subscription.
    pub fn flag_sender(&self) -> SubscriptionSender<Vec<FeatureFlag>> {
        self.flag_sender.clone()
    }

    pub fn clear_log(&self) {
        self.log.clear();
        self.log.message(LogCategory::System, "Event log cleared");
    }

    /// Stop every background task and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down session");
        self.ready.store(false, Ordering::Release);
        self.cancellation_token.cancel();
        self.receivers.lock().take();

        let pumps = std::mem::take(&mut *self.pumps.lock());
        let mut applied = 0;
        for pump in pumps {
            applied += pump.await.unwrap_or_default();
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }

        info!(applied, "Session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AckFailure;
    use crate::feed::ContentCard;
    use crate::flags::NoOpImpressionSink;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStateSource for CountingSource {
        async fn request_refresh(&self, _kind: RefreshKind) -> std::result::Result<(), AckFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn create_test_session() -> (Session, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::default());
        let session = Session::new(
            EngineConfig::default(),
            source.clone(),
            Arc::new(NoOpImpressionSink),
        )
        .unwrap();
        (session, source)
    }

    #[tokio::test]
    async fn test_refresh_before_start_is_not_ready() {
        let (session, source) = create_test_session();

        assert!(matches!(
            session.refresh_feed().await,
            Err(Error::NotReady(_))
        ));
        assert!(matches!(
            session.refresh_flags().await,
            Err(Error::NotReady(_))
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_anonymous_start_does_not_request_feed() {
        let (session, source) = create_test_session();
        session.start().await.unwrap();

        assert!(session.is_ready());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(
            session
                .log()
                .snapshot()
                .iter()
                .any(|e| e.message() == Some("Content feed subscribed; waiting for an identified user"))
        );

        session.shutdown().await;
        assert!(!session.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_rearms_feed_refresh() {
        let (session, source) = create_test_session();
        session.start().await.unwrap();

        let sender = session.feed_sender();
        let deliver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            sender
                .deliver(ContentFeed::new(vec![ContentCard::new("card-1")]))
                .await
        });

        let outcome = session.identify(Some("user-42")).await.unwrap();
        assert!(deliver.await.unwrap());

        assert!(outcome.is_updated());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.user().as_deref(), Some("user-42"));

        tokio::task::yield_now().await;
        assert!(matches!(
            session.feed_status(),
            FeedStatus::Available { displayable: 1, .. }
        ));

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_none_clears_user() {
        let (session, _source) = create_test_session();
        session.start().await.unwrap();
        session.identify(Some("user-42")).await;

        assert!(session.identify(None).await.is_none());
        assert!(session.user().is_none());

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_after_shutdown_fails() {
        let (session, _source) = create_test_session();
        session.shutdown().await;

        assert!(matches!(session.start().await, Err(Error::NotReady(_))));
        assert!(!session.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_feed_refresh_warns() {
        let (session, source) = create_test_session();
        session.start().await.unwrap();

        let outcome = session.refresh_feed().await.unwrap();

        assert_eq!(outcome, RefreshOutcome::NoData { attempts: 4 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(
            session
                .log()
                .snapshot()
                .iter()
                .any(|e| e.message() == Some("No user identified; the content feed may be empty"))
        );

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear_log_leaves_one_entry() {
        let (session, _source) = create_test_session();
        session.start().await.unwrap();

        session.clear_log();

        let entries = session.log().snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message(), Some("Event log cleared"));

        session.shutdown().await;
    }
}
