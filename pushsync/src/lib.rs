//! Push interception and remote state synchronization.
//!
//! Two halves share one [`EventLog`]:
//!
//! - [`push`]: a per-origin background agent that decides, for every inbound
//!   push, whether to render the notification itself or hand it to the host's
//!   default delivery, and routes clicks on what it rendered.
//! - [`session`]: the foreground context holding the last known content feed
//!   and feature flags, refreshed over an acknowledgment channel and delivered
//!   over a separate subscription channel.

pub mod cache;
pub mod config;
pub mod error;
pub mod event_log;
pub mod feed;
pub mod flags;
pub mod logging;
pub mod push;
pub mod refresh;
pub mod session;

pub use cache::{CachedState, EPOCH_SENTINEL, Populated, SubscriptionCache};
pub use config::EngineConfig;
pub use error::{AckFailure, Error, Result};
pub use event_log::{EventLog, LogCategory, LogEntry};
pub use push::{AgentHandle, AgentRegistry, PushDisposition, PushHost, PushInterceptionAgent};
pub use refresh::{RefreshKind, RefreshOrchestrator, RefreshOutcome, RemoteStateSource};
pub use session::Session;
