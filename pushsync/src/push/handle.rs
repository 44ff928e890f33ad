//! Handle for talking to a running [`PushInterceptionAgent`](super::PushInterceptionAgent).

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::agent::{AgentLifecycle, AgentMessage, PushDisposition};
use super::click::{ClickOutcome, NotificationEvent};
use super::host::{Permission, RawPush};
use super::renderer::NotificationData;
use crate::error::Result;

/// Default mailbox capacity for an agent.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default timeout for send operations when the mailbox is full.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The agent has stopped and is no longer accepting messages.
    ActorStopped,
    /// The mailbox is full.
    MailboxFull,
    /// The send operation timed out.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ActorStopped => write!(f, "Agent has stopped"),
            SendError::MailboxFull => write!(f, "Mailbox is full"),
            SendError::Timeout => write!(f, "Send operation timed out"),
        }
    }
}

impl std::error::Error for SendError {}

/// A cloneable handle to one agent.
#[derive(Clone)]
pub struct AgentHandle {
    sender: mpsc::Sender<AgentMessage>,
    cancellation_token: CancellationToken,
    lifecycle: watch::Receiver<AgentLifecycle>,
    origin: String,
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("origin", &self.origin)
            .field("lifecycle", &*self.lifecycle.borrow())
            .field("queued", &self.queued())
            .finish()
    }
}

impl AgentHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<AgentMessage>,
        cancellation_token: CancellationToken,
        lifecycle: watch::Receiver<AgentLifecycle>,
        origin: String,
    ) -> Self {
        Self {
            sender,
            cancellation_token,
            lifecycle,
            origin,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn lifecycle(&self) -> AgentLifecycle {
        *self.lifecycle.borrow()
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
            && !self.cancellation_token.is_cancelled()
            && self.lifecycle() != AgentLifecycle::Terminated
    }

    /// Messages waiting in the mailbox.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Hand a push to the agent and wait until its cycle completes.
    ///
    /// The returned disposition is the "processing complete" signal.
    pub async fn push(&self, message: RawPush) -> std::result::Result<PushDisposition, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::Push {
            message,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| SendError::ActorStopped)
    }

    /// Hand a push to the agent without waiting for the outcome.
    pub fn try_push(&self, message: RawPush) -> std::result::Result<(), SendError> {
        self.try_send(AgentMessage::Push {
            message,
            reply: None,
        })
    }

    /// Report a click or dismissal and wait for routing to finish.
    pub async fn notification_event(
        &self,
        event: NotificationEvent,
    ) -> std::result::Result<ClickOutcome, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::Notification {
            event,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| SendError::ActorStopped)
    }

    /// Shorthand for a [`NotificationEvent::Clicked`].
    pub async fn click(
        &self,
        notification_id: &str,
        action: Option<&str>,
        data: NotificationData,
    ) -> std::result::Result<ClickOutcome, SendError> {
        self.notification_event(NotificationEvent::click(notification_id, action, data))
            .await
    }

    /// Shorthand for a [`NotificationEvent::Closed`].
    pub async fn close(&self, notification_id: &str) -> std::result::Result<ClickOutcome, SendError> {
        self.notification_event(NotificationEvent::closed(notification_id))
            .await
    }

    /// Move the agent to `Activated`, returning the permission it observed.
    pub async fn activate(&self) -> std::result::Result<Permission, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::Activate { reply }).await?;
        rx.await.map_err(|_| SendError::ActorStopped)
    }

    /// Render a fixed test notification. Yields its id.
    pub async fn show_test_notification(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::ShowTest { reply }).await?;
        rx.await.map_err(|_| SendError::ActorStopped)?
    }

    /// Stop the agent and wait until it reports `Terminated`.
    pub async fn terminate(&self) {
        if self.send(AgentMessage::Terminate).await.is_err() {
            self.cancellation_token.cancel();
        }
        let mut lifecycle = self.lifecycle.clone();
        let _ = lifecycle
            .wait_for(|state| *state == AgentLifecycle::Terminated)
            .await;
    }

    async fn send(&self, msg: AgentMessage) -> std::result::Result<(), SendError> {
        self.send_with_timeout(msg, DEFAULT_SEND_TIMEOUT).await
    }

    /// Send with backpressure: a non-blocking attempt first, then a bounded wait.
    pub(crate) async fn send_with_timeout(
        &self,
        msg: AgentMessage,
        timeout: Duration,
    ) -> std::result::Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                match tokio::time::timeout(timeout, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::ActorStopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    fn try_send(&self, msg: AgentMessage) -> std::result::Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ActorStopped,
        })
    }
}
