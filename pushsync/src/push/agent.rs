//! The push interception agent.
//!
//! One long-lived actor per origin. It owns a mailbox of inbound pushes and
//! notification interactions and runs each one as an independent cycle on a
//! [`JoinSet`], so a slow or failing cycle never holds up the next message.
//!
//! For every push the agent either takes over rendering or defers to the
//! host's default delivery. Whatever happens, the push ends up in front of
//! one of the two: a render failure falls back to default delivery, and
//! pushes still queued at termination are handed to default delivery too.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::click::{ClickOutcome, ClickRouter, ClickState, NotificationEvent};
use super::handle::{AgentHandle, DEFAULT_MAILBOX_CAPACITY};
use super::host::{Permission, PushHost, RawPush};
use super::payload::PushPayload;
use super::record::{NotificationAction, NotificationIdGenerator, NotificationRecord};
use super::renderer::{NotificationRenderer, RendererConfig};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event_log::{EventLog, LogCategory};

/// Default delay before the permission diagnostic after a deferred push.
pub const DEFAULT_PERMISSION_CHECK_DELAY: Duration = Duration::from_secs(1);

/// Finished notifications remembered for duplicate-event suppression.
const MAX_FINISHED_NOTIFICATIONS: usize = 512;

/// Agent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLifecycle {
    Registered,
    Activated,
    Terminated,
}

impl fmt::Display for AgentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => f.write_str("registered"),
            Self::Activated => f.write_str("activated"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

/// Why a push went to default delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    /// Empty, non-JSON, `null` or non-object body.
    Unparseable(String),
    PermissionNotGranted(Permission),
    /// The agent stopped before the push was processed.
    AgentTerminated,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparseable(detail) => write!(f, "unparseable payload: {detail}"),
            Self::PermissionNotGranted(p) => write!(f, "notification permission is {p}"),
            Self::AgentTerminated => f.write_str("agent terminated"),
        }
    }
}

/// How a push cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDisposition {
    /// The agent rendered the notification itself.
    Rendered { id: String },
    /// Default delivery handled the push; no record was built.
    Deferred { reason: DeferReason },
    /// Rendering failed and default delivery handled the push instead.
    FellBack { error: String },
}

impl PushDisposition {
    pub fn rendered_id(&self) -> Option<&str> {
        match self {
            Self::Rendered { id } => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for PushDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rendered { id } => write!(f, "rendered ({id})"),
            Self::Deferred { reason } => write!(f, "deferred: {reason}"),
            Self::FellBack { error } => write!(f, "fell back to default delivery: {error}"),
        }
    }
}

/// Messages accepted by the agent.
pub enum AgentMessage {
    Push {
        message: RawPush,
        reply: Option<oneshot::Sender<PushDisposition>>,
    },
    Notification {
        event: NotificationEvent,
        reply: Option<oneshot::Sender<ClickOutcome>>,
    },
    Activate {
        reply: oneshot::Sender<Permission>,
    },
    ShowTest {
        reply: oneshot::Sender<Result<String>>,
    },
    Terminate,
}

impl fmt::Debug for AgentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push { message, .. } => f
                .debug_struct("Push")
                .field("bytes", &message.data().map_or(0, <[u8]>::len))
                .finish(),
            Self::Notification { event, .. } => {
                f.debug_tuple("Notification").field(event).finish()
            }
            Self::Activate { .. } => f.write_str("Activate"),
            Self::ShowTest { .. } => f.write_str("ShowTest"),
            Self::Terminate => f.write_str("Terminate"),
        }
    }
}

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub origin: Url,
    pub renderer: RendererConfig,
    pub permission_check_delay: Duration,
    pub mailbox_capacity: usize,
}

impl AgentConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            renderer: RendererConfig::default(),
            permission_check_delay: DEFAULT_PERMISSION_CHECK_DELAY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    pub fn from_engine(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            origin: config.origin_url()?,
            renderer: RendererConfig {
                default_icon: config.default_icon.clone(),
                badge_icon: config.badge_icon.clone(),
                source: config.notification_source.clone(),
            },
            permission_check_delay: Duration::from_millis(config.permission_check_delay_ms),
            mailbox_capacity: config.mailbox_capacity,
        })
    }

    /// Registry key: the serialized origin.
    pub fn origin_key(&self) -> String {
        self.origin.origin().ascii_serialization()
    }
}

/// State shared by all cycles of one agent.
struct AgentCore {
    config: AgentConfig,
    host: PushHost,
    renderer: NotificationRenderer,
    router: ClickRouter,
    ids: NotificationIdGenerator,
    /// Terminal states only; an unknown id is `Displayed`.
    finished: DashMap<String, ClickState>,
    finished_order: Mutex<VecDeque<String>>,
    log: EventLog,
}

impl AgentCore {
    fn new(config: AgentConfig, host: PushHost, log: EventLog) -> Self {
        Self {
            renderer: NotificationRenderer::new(host.display.clone(), config.renderer.clone()),
            router: ClickRouter::new(host.clients.clone(), config.origin.clone(), log.clone()),
            ids: NotificationIdGenerator::new(format!("{}-notification", config.renderer.source)),
            finished: DashMap::new(),
            finished_order: Mutex::new(VecDeque::new()),
            config,
            host,
            log,
        }
    }

    /// One interception cycle.
    async fn handle_push(&self, message: &RawPush) -> PushDisposition {
        let permission = self.host.permission.permission();
        let parsed = PushPayload::parse(message.data());

        debug!(
            bytes = message.data().map_or(0, <[u8]>::len),
            %permission,
            parsed = parsed.is_ok(),
            "Push received"
        );

        let payload = match parsed {
            Ok(payload) if permission.is_granted() => payload,
            Ok(_) => {
                return self
                    .defer(message, DeferReason::PermissionNotGranted(permission))
                    .await;
            }
            Err(e) => {
                let detail = match e {
                    Error::Parse(detail) => detail,
                    other => other.to_string(),
                };
                return self.defer(message, DeferReason::Unparseable(detail)).await;
            }
        };

        let record = NotificationRecord::from_payload(self.ids.next_id(), &payload);
        self.log.append(
            LogCategory::Push,
            json!({
                "message": "Intercepting push notification",
                "id": record.id,
                "title": record.title,
                "url": record.target_url,
                "campaign_id": record.campaign_id,
            }),
        );

        match self.renderer.render(&record, payload.to_value()).await {
            Ok(_) => {
                info!(id = %record.id, "Notification displayed");
                PushDisposition::Rendered { id: record.id }
            }
            Err(e) => {
                self.log.append(
                    LogCategory::Error,
                    json!({
                        "message": "Failed to display notification, falling back to default delivery",
                        "id": record.id,
                        "detail": e.to_string(),
                    }),
                );
                self.host.default_delivery.deliver(message).await;
                PushDisposition::FellBack {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn defer(&self, message: &RawPush, reason: DeferReason) -> PushDisposition {
        self.log.append(
            LogCategory::Push,
            json!({
                "message": "Push handed to default delivery",
                "reason": reason.to_string(),
            }),
        );
        self.host.default_delivery.deliver(message).await;
        PushDisposition::Deferred { reason }
    }

    /// Logs whether permission is actually granted, some time after a deferral.
    async fn permission_diagnostic(&self, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(self.config.permission_check_delay) => {}
        }

        match self.host.permission.permission() {
            Permission::Granted => {
                info!("Notification permission is granted, notifications should display");
            }
            other => {
                warn!(permission = %other, "Notification permission is not granted");
            }
        }
    }

    async fn handle_event(&self, event: &NotificationEvent) -> ClickOutcome {
        let id = event.notification_id();
        // The shard lock is held from lookup to insert, so concurrent
        // events for one id see exactly one transition.
        match self.finished.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                debug!(id, state = ?entry.get(), "Ignoring event for finished notification");
                return ClickOutcome::Ignored;
            }
            Entry::Vacant(entry) => match ClickState::Displayed.transition(event) {
                Some(next) => {
                    entry.insert(next);
                }
                None => return ClickOutcome::Ignored,
            },
        }
        self.remember_finished(id);

        if matches!(event, NotificationEvent::Clicked { .. }) {
            if let Err(e) = self.host.display.close(id).await {
                debug!(id, error = %e, "Could not close clicked notification");
            }
        }

        self.router.route(event).await
    }

    async fn activate(&self) -> Permission {
        let permission = self.host.permission.permission();
        match permission {
            Permission::Granted => {
                self.log.message(
                    LogCategory::System,
                    "Push agent activated, notification permission is granted",
                );
            }
            Permission::Denied => {
                warn!("Notification permission is denied, notifications will not display");
                self.log.append(
                    LogCategory::System,
                    json!({
                        "message": "Push agent activated, notification permission is denied",
                        "level": "warn",
                    }),
                );
            }
            Permission::Default => {
                warn!("Notification permission has not been requested yet");
                self.log.append(
                    LogCategory::System,
                    json!({
                        "message": "Push agent activated, user needs to grant notification permission",
                        "level": "warn",
                    }),
                );
            }
        }

        match self.host.clients.claim().await {
            Ok(()) => debug!("Agent now controls all clients"),
            Err(e) => self.log.append(
                LogCategory::Error,
                json!({ "message": "Failed to claim clients", "detail": e.to_string() }),
            ),
        }
        permission
    }

    async fn show_test(&self) -> Result<String> {
        let permission = self.host.permission.permission();
        if !permission.is_granted() {
            return Err(Error::render(format!(
                "cannot show test notification, permission is {permission}"
            )));
        }

        let target = self.config.origin.to_string();
        let record = NotificationRecord {
            id: self.ids.next_id(),
            title: "Test Notification".to_string(),
            body: "This is a test notification from the push agent.".to_string(),
            image_url: None,
            actions: NotificationAction::defaults_for(Some(&target)),
            target_url: Some(target),
            campaign_id: None,
        };

        self.renderer
            .render(&record, json!({ "test": true }))
            .await?;
        self.log.append(
            LogCategory::Push,
            json!({ "message": "Test notification displayed", "id": record.id }),
        );
        Ok(record.id)
    }

    /// Evicts the oldest finished ids once over capacity.
    fn remember_finished(&self, id: &str) {
        let mut order = self.finished_order.lock();
        order.push_back(id.to_string());
        while order.len() > MAX_FINISHED_NOTIFICATIONS {
            if let Some(oldest) = order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
    }
}

/// The actor.
pub struct PushInterceptionAgent {
    core: Arc<AgentCore>,
    mailbox: mpsc::Receiver<AgentMessage>,
    cancellation_token: CancellationToken,
    lifecycle: watch::Sender<AgentLifecycle>,
    cycles: JoinSet<()>,
}

impl PushInterceptionAgent {
    /// Spawn an agent and return its handle.
    ///
    /// Cancelling `cancellation_token` terminates the agent.
    pub fn spawn(
        config: AgentConfig,
        host: PushHost,
        log: EventLog,
        cancellation_token: CancellationToken,
    ) -> AgentHandle {
        let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let (lifecycle, lifecycle_rx) = watch::channel(AgentLifecycle::Registered);
        let origin = config.origin_key();

        let core = Arc::new(AgentCore::new(config, host, log.clone()));

        let agent = Self {
            core,
            mailbox,
            cancellation_token: cancellation_token.clone(),
            lifecycle,
            cycles: JoinSet::new(),
        };

        log.append(
            LogCategory::System,
            json!({ "message": "Push agent registered", "origin": origin }),
        );
        tokio::spawn(agent.run());

        AgentHandle::new(sender, cancellation_token, lifecycle_rx, origin)
    }

    async fn run(mut self) {
        debug!(origin = %self.core.config.origin, "Push agent started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    debug!("Push agent cancelled");
                    break;
                }

                Some(joined) = self.cycles.join_next(), if !self.cycles.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Push agent cycle panicked");
                    }
                }

                msg = self.mailbox.recv() => match msg {
                    Some(AgentMessage::Terminate) | None => break,
                    Some(msg) => self.dispatch(msg).await,
                },
            }
        }

        self.shutdown().await;
    }

    async fn dispatch(&mut self, msg: AgentMessage) {
        match msg {
            AgentMessage::Push { message, reply } => {
                let core = Arc::clone(&self.core);
                let token = self.cancellation_token.clone();
                self.cycles.spawn(async move {
                    let disposition = core.handle_push(&message).await;
                    let deferred = matches!(disposition, PushDisposition::Deferred { .. });
                    if let Some(reply) = reply {
                        let _ = reply.send(disposition);
                    }
                    if deferred {
                        core.permission_diagnostic(token).await;
                    }
                });
            }
            AgentMessage::Notification { event, reply } => {
                let core = Arc::clone(&self.core);
                self.cycles.spawn(async move {
                    let outcome = core.handle_event(&event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                });
            }
            AgentMessage::ShowTest { reply } => {
                let core = Arc::clone(&self.core);
                self.cycles.spawn(async move {
                    let _ = reply.send(core.show_test().await);
                });
            }
            AgentMessage::Activate { reply } => {
                let permission = self.core.activate().await;
                self.lifecycle.send_replace(AgentLifecycle::Activated);
                let _ = reply.send(permission);
            }
            AgentMessage::Terminate => {}
        }
    }

    async fn shutdown(mut self) {
        self.mailbox.close();
        while let Ok(msg) = self.mailbox.try_recv() {
            if let AgentMessage::Push { message, reply } = msg {
                self.core.host.default_delivery.deliver(&message).await;
                if let Some(reply) = reply {
                    let _ = reply.send(PushDisposition::Deferred {
                        reason: DeferReason::AgentTerminated,
                    });
                }
            }
        }

        // Stops pending permission diagnostics; in-flight cycles still finish.
        self.cancellation_token.cancel();
        while let Some(joined) = self.cycles.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Push agent cycle panicked");
            }
        }

        self.core.log.message(LogCategory::System, "Push agent terminated");
        self.lifecycle.send_replace(AgentLifecycle::Terminated);
        debug!(origin = %self.core.config.origin, "Push agent stopped");
    }
}
