//! Host platform capabilities used by the push agent.
//!
//! The agent never talks to a platform directly. Everything it needs from
//! the outside world goes through these traits so hosts (a browser bridge,
//! the CLI console, test fakes) can be swapped freely.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::renderer::NotificationOptions;
use crate::error::Result;

/// Notification permission as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

impl Permission {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => f.write_str("granted"),
            Self::Denied => f.write_str("denied"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// A push message exactly as delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPush {
    pub data: Option<Vec<u8>>,
    pub received_at: DateTime<Utc>,
}

impl RawPush {
    pub fn new(data: Option<Vec<u8>>) -> Self {
        Self {
            data,
            received_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(Some(body.into().into_bytes()))
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Lossy text form for logging.
    pub fn preview(&self) -> Option<String> {
        self.data
            .as_deref()
            .map(|d| String::from_utf8_lossy(d).into_owned())
    }
}

/// An open application window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub url: String,
}

impl ClientInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Shows and dismisses notifications.
#[async_trait]
pub trait NotificationDisplay: Send + Sync {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()>;

    async fn close(&self, tag: &str) -> Result<()>;
}

/// Reports the current notification permission.
pub trait PermissionProbe: Send + Sync {
    fn permission(&self) -> Permission;
}

/// The platform's own push handling, used whenever the agent does not render.
#[async_trait]
pub trait DefaultDelivery: Send + Sync {
    async fn deliver(&self, message: &RawPush);
}

/// Enumerates and controls open application clients.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// All open window clients, including uncontrolled ones.
    async fn match_all(&self) -> Result<Vec<ClientInfo>>;

    async fn navigate(&self, client_id: &str, url: &str) -> Result<()>;

    async fn focus(&self, client_id: &str) -> Result<()>;

    async fn open_window(&self, url: &str) -> Result<()>;

    /// Take control of every open client.
    async fn claim(&self) -> Result<()>;
}

/// Bundle of host capabilities handed to an agent.
#[derive(Clone)]
pub struct PushHost {
    pub display: Arc<dyn NotificationDisplay>,
    pub permission: Arc<dyn PermissionProbe>,
    pub default_delivery: Arc<dyn DefaultDelivery>,
    pub clients: Arc<dyn ClientDirectory>,
}

impl PushHost {
    pub fn new(
        display: Arc<dyn NotificationDisplay>,
        permission: Arc<dyn PermissionProbe>,
        default_delivery: Arc<dyn DefaultDelivery>,
        clients: Arc<dyn ClientDirectory>,
    ) -> Self {
        Self {
            display,
            permission,
            default_delivery,
            clients,
        }
    }
}

impl fmt::Debug for PushHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushHost")
            .field("permission", &self.permission.permission())
            .finish_non_exhaustive()
    }
}
