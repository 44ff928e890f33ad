//! Push interception.
//!
//! A [`PushInterceptionAgent`] receives raw pushes through its
//! [`AgentHandle`], decides whether to render them itself via the
//! [`NotificationRenderer`] or hand them to the host's default delivery, and
//! routes clicks on the notifications it rendered through the [`ClickRouter`].
//!
//! All platform access goes through the traits in [`host`].

pub mod agent;
pub mod click;
pub mod handle;
pub mod host;
pub mod payload;
pub mod record;
pub mod registry;
pub mod renderer;

pub use agent::{
    AgentConfig, AgentLifecycle, AgentMessage, DEFAULT_PERMISSION_CHECK_DELAY, DeferReason,
    PushDisposition, PushInterceptionAgent,
};
pub use click::{APP_ROOT, ClickOutcome, ClickRouter, ClickState, NotificationEvent};
pub use handle::{AgentHandle, DEFAULT_MAILBOX_CAPACITY, DEFAULT_SEND_TIMEOUT, SendError};
pub use host::{
    ClientDirectory, ClientInfo, DefaultDelivery, NotificationDisplay, Permission,
    PermissionProbe, PushHost, RawPush,
};
pub use payload::{DEFAULT_TITLE, PayloadField, PushPayload};
pub use record::{
    ACTION_CLOSE, ACTION_VIEW, NotificationAction, NotificationIdGenerator, NotificationRecord,
};
pub use registry::AgentRegistry;
pub use renderer::{
    NotificationData, NotificationOptions, NotificationRenderer, RendererConfig,
    VIBRATION_PATTERN,
};
