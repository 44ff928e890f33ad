//! Engine-wide error types.

use thiserror::Error;

use crate::push::SendError;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
///
/// None of these escape a subsystem entry point: the push agent, the refresh
/// orchestrator and the flag gate convert them into an event log entry plus a
/// safe default before returning.
#[derive(Error, Debug)]
pub enum Error {
    /// Push body was empty, not JSON, or not a JSON object.
    #[error("Push payload could not be parsed: {0}")]
    Parse(String),

    /// The host display capability refused to show a notification.
    #[error("Notification render failed: {0}")]
    Render(String),

    /// The remote state service refused or failed the refresh request.
    #[error("Refresh request failed: {0}")]
    RefreshAck(#[from] AckFailure),

    /// No client could be focused, navigated or opened.
    #[error("Click routing failed: {0}")]
    ClickRouting(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The push agent could not be reached.
    #[error("Push agent unavailable: {0}")]
    Agent(#[from] SendError),

    /// An operation was attempted before the session was started.
    #[error("Session is not ready: {0}")]
    NotReady(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn click_routing(msg: impl Into<String>) -> Self {
        Self::ClickRouting(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }
}

/// Reasons the acknowledgment channel can refuse a refresh request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AckFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited")]
    RateLimited,

    #[error("feature disabled on the remote service")]
    FeatureDisabled,

    #[error("request timed out")]
    Timeout,
}
