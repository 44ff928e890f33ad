//! Out-of-band subscription channel.
//!
//! The remote state service delivers updated state independently of any
//! refresh acknowledgment. Updates travel through a bounded mpsc channel and a
//! pump task writes each one into its [`StateSink`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::StateSink;

/// Default capacity of a subscription channel.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

/// One state delivery from the remote service.
#[derive(Debug, Clone)]
pub struct StateUpdate<T> {
    pub value: T,
    pub received_at: DateTime<Utc>,
}

/// Remote-facing end of the subscription channel.
#[derive(Debug)]
pub struct SubscriptionSender<T> {
    tx: mpsc::Sender<StateUpdate<T>>,
}

impl<T> Clone for SubscriptionSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> SubscriptionSender<T> {
    /// Deliver a value stamped with the current time.
    ///
    /// Returns `false` once the pump has stopped.
    pub async fn deliver(&self, value: T) -> bool {
        self.deliver_at(value, Utc::now()).await
    }

    pub async fn deliver_at(&self, value: T, received_at: DateTime<Utc>) -> bool {
        self.tx
            .send(StateUpdate { value, received_at })
            .await
            .is_ok()
    }
}

/// Engine-facing end of the subscription channel.
#[derive(Debug)]
pub struct SubscriptionReceiver<T> {
    rx: mpsc::Receiver<StateUpdate<T>>,
}

/// Create a subscription channel pair.
pub fn subscription_channel<T>(
    capacity: usize,
) -> (SubscriptionSender<T>, SubscriptionReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SubscriptionSender { tx }, SubscriptionReceiver { rx })
}

impl<T: Send + 'static> SubscriptionReceiver<T> {
    /// Spawn a task writing every update into `sink`.
    ///
    /// The task ends when all senders are dropped or `token` is cancelled and
    /// yields the number of updates applied.
    pub fn spawn_pump<S>(
        mut self,
        name: &'static str,
        sink: Arc<S>,
        token: CancellationToken,
    ) -> JoinHandle<u64>
    where
        S: StateSink<T> + ?Sized,
    {
        tokio::spawn(async move {
            let mut applied = 0u64;
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!(channel = name, applied, "Subscription pump cancelled");
                        break;
                    }

                    update = self.rx.recv() => match update {
                        Some(update) => {
                            sink.accept(update.value, update.received_at);
                            applied += 1;
                            debug!(channel = name, applied, "Subscription update applied");
                        }
                        None => {
                            debug!(channel = name, applied, "Subscription channel closed");
                            break;
                        }
                    },
                }
            }
            applied
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SubscriptionCache;

    #[tokio::test]
    async fn test_pump_writes_into_cache() {
        let cache = Arc::new(SubscriptionCache::<Vec<u8>>::new());
        let (tx, rx) = subscription_channel(4);
        let token = CancellationToken::new();
        let pump = rx.spawn_pump("test", Arc::clone(&cache), token);

        assert!(tx.deliver(vec![1, 2]).await);
        drop(tx);

        assert_eq!(pump.await.unwrap(), 1);
        assert!(cache.is_valid());
    }

    #[tokio::test]
    async fn test_pump_stops_on_cancel() {
        let cache = Arc::new(SubscriptionCache::<Vec<u8>>::new());
        let (tx, rx) = subscription_channel(4);
        let token = CancellationToken::new();
        let pump = rx.spawn_pump("test", Arc::clone(&cache), token.clone());

        token.cancel();
        assert_eq!(pump.await.unwrap(), 0);
        assert!(!tx.deliver(vec![1]).await);
        assert!(!cache.is_valid());
    }
}
