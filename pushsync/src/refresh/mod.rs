//! Remote state refresh.
//!
//! - [`backoff`]: the bounded polling primitive
//! - [`subscription`]: the out-of-band delivery channel feeding caches
//! - [`orchestrator`]: ack-channel requests reconciled with cache validity

pub mod backoff;
pub mod orchestrator;
pub mod subscription;

pub use backoff::{BoundedPoll, DEFAULT_POLL_DELAYS, PollOutcome};
pub use orchestrator::{RefreshKind, RefreshOrchestrator, RefreshOutcome, RemoteStateSource};
pub use subscription::{
    DEFAULT_SUBSCRIPTION_CAPACITY, StateUpdate, SubscriptionReceiver, SubscriptionSender,
    subscription_channel,
};
