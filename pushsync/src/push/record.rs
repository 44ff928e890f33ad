//! Normalized notification records.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::payload::{PayloadField, PushPayload};

/// Action id that dismisses a notification.
pub const ACTION_CLOSE: &str = "close";
/// Action id that opens the notification's target.
pub const ACTION_VIEW: &str = "view";

/// One button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    #[serde(rename = "title")]
    pub label: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            label: label.into(),
        }
    }

    pub fn view() -> Self {
        Self::new(ACTION_VIEW, "View")
    }

    pub fn close() -> Self {
        Self::new(ACTION_CLOSE, "Close")
    }

    /// "View" only when there is somewhere to go; "Close" always.
    pub fn defaults_for(target_url: Option<&str>) -> Vec<Self> {
        let mut actions = Vec::with_capacity(2);
        if target_url.is_some() {
            actions.push(Self::view());
        }
        actions.push(Self::close());
        actions
    }
}

/// A notification ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Unique per display; also used as the platform tag.
    pub id: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub campaign_id: Option<String>,
    pub actions: Vec<NotificationAction>,
}

impl NotificationRecord {
    /// Build a record from a payload, resolving every field through its aliases.
    pub fn from_payload(id: String, payload: &PushPayload) -> Self {
        let target_url = payload.resolve(PayloadField::TargetUrl);
        Self {
            id,
            title: payload.resolve(PayloadField::Title).unwrap_or_default(),
            body: payload.resolve(PayloadField::Body).unwrap_or_default(),
            image_url: payload.resolve(PayloadField::ImageUrl),
            actions: NotificationAction::defaults_for(target_url.as_deref()),
            target_url,
            campaign_id: payload.resolve(PayloadField::CampaignId),
        }
    }
}

/// Generates notification ids that stay unique within one millisecond.
///
/// Ids have the form `{prefix}-{unix_millis}-{sequence}`.
#[derive(Debug)]
pub struct NotificationIdGenerator {
    prefix: String,
    sequence: AtomicU64,
}

impl NotificationIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", self.prefix, Utc::now().timestamp_millis(), seq)
    }
}
