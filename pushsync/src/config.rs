//! Engine configuration.
//!
//! Defaults cover a local setup. Every field can be overridden from the
//! environment (`PUSHSYNC_*`, optionally via a `.env` file) or from a JSON
//! file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::event_log::DEFAULT_EVENT_LOG_CAPACITY;
use crate::flags::{FlagBinding, default_bindings};
use crate::push::DEFAULT_MAILBOX_CAPACITY;
use crate::refresh::BoundedPoll;

const ENV_PREFIX: &str = "PUSHSYNC_";

fn default_origin() -> String {
    "http://localhost".to_string()
}

fn default_icon() -> String {
    "/favicon.ico".to_string()
}

fn default_source() -> String {
    "braze".to_string()
}

fn default_poll_delays_ms() -> Vec<u64> {
    vec![500, 1000, 1500, 2000]
}

fn default_event_log_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

fn default_permission_check_delay_ms() -> u64 {
    1000
}

fn default_identify_refresh_delay_ms() -> u64 {
    500
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Origin the push agent serves; clicks only focus clients on it.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Icon used when a push carries no image.
    #[serde(default = "default_icon")]
    pub default_icon: String,
    #[serde(default = "default_icon")]
    pub badge_icon: String,
    /// Recorded in each notification's data bag.
    #[serde(default = "default_source")]
    pub notification_source: String,
    /// Delay before each refresh poll check, relative to the previous one.
    #[serde(default = "default_poll_delays_ms")]
    pub poll_delays_ms: Vec<u64>,
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    #[serde(default = "default_permission_check_delay_ms")]
    pub permission_check_delay_ms: u64,
    /// Delay between identifying a user and refreshing their feed.
    #[serde(default = "default_identify_refresh_delay_ms")]
    pub identify_refresh_delay_ms: u64,
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Which flags drive which UI regions. Only settable from a file.
    #[serde(default = "default_bindings")]
    pub flag_bindings: Vec<FlagBinding>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            default_icon: default_icon(),
            badge_icon: default_icon(),
            notification_source: default_source(),
            poll_delays_ms: default_poll_delays_ms(),
            event_log_capacity: default_event_log_capacity(),
            permission_check_delay_ms: default_permission_check_delay_ms(),
            identify_refresh_delay_ms: default_identify_refresh_delay_ms(),
            mailbox_capacity: default_mailbox_capacity(),
            flag_bindings: default_bindings(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment, after loading `.env`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `PUSHSYNC_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("ORIGIN") {
            config.origin = v;
        }
        if let Some(v) = get("DEFAULT_ICON") {
            config.default_icon = v;
        }
        if let Some(v) = get("BADGE_ICON") {
            config.badge_icon = v;
        }
        if let Some(v) = get("NOTIFICATION_SOURCE") {
            config.notification_source = v;
        }
        if let Some(v) = get("POLL_DELAYS_MS") {
            config.poll_delays_ms = v
                .split(',')
                .map(|part| parse_number("POLL_DELAYS_MS", part.trim()))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = get("EVENT_LOG_CAPACITY") {
            config.event_log_capacity = parse_number("EVENT_LOG_CAPACITY", &v)?;
        }
        if let Some(v) = get("PERMISSION_CHECK_DELAY_MS") {
            config.permission_check_delay_ms = parse_number("PERMISSION_CHECK_DELAY_MS", &v)?;
        }
        if let Some(v) = get("IDENTIFY_REFRESH_DELAY_MS") {
            config.identify_refresh_delay_ms = parse_number("IDENTIFY_REFRESH_DELAY_MS", &v)?;
        }
        if let Some(v) = get("MAILBOX_CAPACITY") {
            config.mailbox_capacity = parse_number("MAILBOX_CAPACITY", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_delays_ms.is_empty() {
            return Err(Error::config("poll_delays_ms must not be empty"));
        }
        if self.event_log_capacity == 0 {
            return Err(Error::config("event_log_capacity must be greater than zero"));
        }
        if self.mailbox_capacity == 0 {
            return Err(Error::config("mailbox_capacity must be greater than zero"));
        }
        self.origin_url()?;
        Ok(())
    }

    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .map_err(|e| Error::config(format!("Invalid origin '{}': {e}", self.origin)))?;
        if !url.origin().is_tuple() {
            return Err(Error::config(format!(
                "Origin '{}' has no host",
                self.origin
            )));
        }
        Ok(url)
    }

    pub fn poll(&self) -> BoundedPoll {
        BoundedPoll::from_millis(&self.poll_delays_ms)
    }

    pub fn identify_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.identify_refresh_delay_ms)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("Invalid {ENV_PREFIX}{name} '{value}': {e}")))
}
