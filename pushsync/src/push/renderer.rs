//! Builds platform notification options from a [`NotificationRecord`].

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::host::NotificationDisplay;
use super::record::{NotificationAction, NotificationRecord};
use crate::error::{Error, Result};

/// Vibration pattern used for every notification.
pub const VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];

/// Opaque bag attached to a displayed notification and handed back on click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub url: Option<String>,
    pub campaign_id: Option<String>,
    /// Unix millis at render time.
    pub timestamp: i64,
    pub source: String,
    #[serde(default)]
    pub original_data: Value,
}

impl NotificationData {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Everything the display capability needs besides the title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub silent: bool,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// Renderer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    pub default_icon: String,
    pub badge_icon: String,
    /// Recorded as `data.source`.
    pub source: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            default_icon: "/favicon.ico".to_string(),
            badge_icon: "/favicon.ico".to_string(),
            source: "braze".to_string(),
        }
    }
}

/// Turns records into displayed notifications.
pub struct NotificationRenderer {
    display: Arc<dyn NotificationDisplay>,
    config: RendererConfig,
}

impl NotificationRenderer {
    pub fn new(display: Arc<dyn NotificationDisplay>, config: RendererConfig) -> Self {
        Self { display, config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Display options for `record`. `original` is the payload it came from.
    pub fn build_options(
        &self,
        record: &NotificationRecord,
        original: Value,
    ) -> NotificationOptions {
        NotificationOptions {
            body: record.body.clone(),
            icon: record
                .image_url
                .clone()
                .unwrap_or_else(|| self.config.default_icon.clone()),
            badge: self.config.badge_icon.clone(),
            tag: record.id.clone(),
            require_interaction: false,
            silent: false,
            vibrate: VIBRATION_PATTERN.to_vec(),
            data: NotificationData {
                url: record.target_url.clone(),
                campaign_id: record.campaign_id.clone(),
                timestamp: Utc::now().timestamp_millis(),
                source: self.config.source.clone(),
                original_data: original,
            },
            actions: record.actions.clone(),
        }
    }

    /// Show `record`. Resolves once the display capability has answered.
    pub async fn render(
        &self,
        record: &NotificationRecord,
        original: Value,
    ) -> Result<NotificationOptions> {
        let options = self.build_options(record, original);
        debug!(
            id = %record.id,
            title = %record.title,
            url = ?record.target_url,
            "Displaying notification"
        );

        match self.display.show(&record.title, &options).await {
            Ok(()) => Ok(options),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Notification display failed");
                Err(match e {
                    Error::Render(_) => e,
                    other => Error::render(other.to_string()),
                })
            }
        }
    }
}
