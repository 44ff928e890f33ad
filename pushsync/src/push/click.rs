//! Routing user interaction with a displayed notification.
//!
//! ```text
//! Displayed --click(close)--> Closed
//! Displayed --click(other)--> Clicked   (focus / navigate / open a client)
//! Displayed --dismissed-----> Closed
//! ```
//!
//! `Clicked` and `Closed` are terminal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::host::{ClientDirectory, ClientInfo};
use super::record::ACTION_CLOSE;
use super::renderer::NotificationData;
use crate::error::{Error, Result};
use crate::event_log::{EventLog, LogCategory};

/// Where a click without a target URL lands.
pub const APP_ROOT: &str = "/";

/// Lifecycle of one displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickState {
    Displayed,
    Clicked,
    Closed,
}

impl ClickState {
    /// Next state for `event`, or `None` if the event is not accepted here.
    pub fn transition(self, event: &NotificationEvent) -> Option<ClickState> {
        match (self, event) {
            (Self::Displayed, NotificationEvent::Clicked { action, .. })
                if action.as_deref() == Some(ACTION_CLOSE) =>
            {
                Some(Self::Closed)
            }
            (Self::Displayed, NotificationEvent::Clicked { .. }) => Some(Self::Clicked),
            (Self::Displayed, NotificationEvent::Closed { .. }) => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Interaction reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Clicked {
        notification_id: String,
        /// `None` for a click on the notification body.
        action: Option<String>,
        #[serde(default)]
        data: NotificationData,
    },
    /// Dismissed without a click.
    Closed { notification_id: String },
}

impl NotificationEvent {
    pub fn click(
        notification_id: impl Into<String>,
        action: Option<&str>,
        data: NotificationData,
    ) -> Self {
        Self::Clicked {
            notification_id: notification_id.into(),
            action: action.map(str::to_string),
            data,
        }
    }

    pub fn closed(notification_id: impl Into<String>) -> Self {
        Self::Closed {
            notification_id: notification_id.into(),
        }
    }

    pub fn notification_id(&self) -> &str {
        match self {
            Self::Clicked {
                notification_id, ..
            }
            | Self::Closed { notification_id } => notification_id,
        }
    }
}

/// What routing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// "close" action: nothing beyond logging.
    Dismissed,
    /// Closed without a click.
    Closed,
    Focused { client_id: String },
    NavigatedAndFocused { client_id: String, url: String },
    Opened { url: String },
    /// Routing failed; logged and swallowed.
    Failed { reason: String },
    /// The notification already reached a terminal state.
    Ignored,
}

/// Decides which client a click goes to.
pub struct ClickRouter {
    clients: Arc<dyn ClientDirectory>,
    origin: Url,
    log: EventLog,
}

impl ClickRouter {
    pub fn new(clients: Arc<dyn ClientDirectory>, origin: Url, log: EventLog) -> Self {
        Self {
            clients,
            origin,
            log,
        }
    }

    /// Route `event`. Never fails: errors become [`ClickOutcome::Failed`].
    pub async fn route(&self, event: &NotificationEvent) -> ClickOutcome {
        match event {
            NotificationEvent::Closed { notification_id } => {
                self.log.append(
                    LogCategory::Click,
                    json!({ "message": "Notification closed", "notification_id": notification_id }),
                );
                ClickOutcome::Closed
            }
            NotificationEvent::Clicked {
                notification_id,
                action,
                ..
            } if action.as_deref() == Some(ACTION_CLOSE) => {
                self.log.append(
                    LogCategory::Click,
                    json!({
                        "message": "Notification closed by user",
                        "notification_id": notification_id,
                    }),
                );
                ClickOutcome::Dismissed
            }
            NotificationEvent::Clicked {
                notification_id,
                action,
                data,
            } => {
                self.log.append(
                    LogCategory::Click,
                    json!({
                        "message": "Notification clicked",
                        "notification_id": notification_id,
                        "action": action.as_deref().unwrap_or("default"),
                        "url": data.url,
                    }),
                );
                match self.open_or_focus(data.url.as_deref()).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(
                            notification_id = %notification_id,
                            error = %e,
                            "Click routing failed"
                        );
                        self.log.append(
                            LogCategory::Error,
                            json!({
                                "message": "Error handling notification click",
                                "detail": e.to_string(),
                            }),
                        );
                        ClickOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        }
    }

    async fn open_or_focus(&self, target: Option<&str>) -> Result<ClickOutcome> {
        let url = target.filter(|u| !u.is_empty()).unwrap_or(APP_ROOT);
        let clients = self.clients.match_all().await?;
        debug!(clients = clients.len(), "Matched open clients");

        if let Some(client) = clients.iter().find(|c| self.same_origin(c)) {
            if url != APP_ROOT && client.url != url {
                self.clients
                    .navigate(&client.id, url)
                    .await
                    .map_err(|e| Error::click_routing(format!("navigate failed: {e}")))?;
                self.clients.focus(&client.id).await?;
                return Ok(ClickOutcome::NavigatedAndFocused {
                    client_id: client.id.clone(),
                    url: url.to_string(),
                });
            }
            self.clients.focus(&client.id).await?;
            return Ok(ClickOutcome::Focused {
                client_id: client.id.clone(),
            });
        }

        self.clients.open_window(url).await?;
        Ok(ClickOutcome::Opened {
            url: url.to_string(),
        })
    }

    fn same_origin(&self, client: &ClientInfo) -> bool {
        match Url::parse(&client.url) {
            Ok(parsed) => parsed.origin() == self.origin.origin(),
            Err(_) => client.url.starts_with(self.origin.as_str().trim_end_matches('/')),
        }
    }
}
