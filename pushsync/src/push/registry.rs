use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::agent::{AgentConfig, PushInterceptionAgent};
use super::handle::AgentHandle;
use super::host::PushHost;
use crate::event_log::EventLog;

/// Keeps at most one live agent per origin.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, AgentHandle>,
    cancellation_token: CancellationToken,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent for `config.origin`.
    ///
    /// Returns the existing handle when a live agent already serves that
    /// origin; a terminated one is replaced.
    pub fn register(&self, config: AgentConfig, host: PushHost, log: EventLog) -> AgentHandle {
        let key = config.origin_key();
        let spawn = || {
            PushInterceptionAgent::spawn(
                config.clone(),
                host.clone(),
                log.clone(),
                self.cancellation_token.child_token(),
            )
        };

        let mut entry = self.agents.entry(key.clone()).or_insert_with(&spawn);
        if !entry.is_alive() {
            info!(origin = %key, "Replacing terminated push agent");
            *entry = spawn();
        } else {
            debug!(origin = %key, "Push agent registered");
        }
        entry.clone()
    }

    pub fn get(&self, origin: &str) -> Option<AgentHandle> {
        self.agents.get(origin).map(|h| h.clone())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Remove and terminate the agent for `origin`.
    pub async fn unregister(&self, origin: &str) -> Option<AgentHandle> {
        let (_, handle) = self.agents.remove(origin)?;
        handle.terminate().await;
        Some(handle)
    }

    /// Terminate every agent.
    pub async fn shutdown(&self) {
        let handles: Vec<AgentHandle> = self.agents.iter().map(|e| e.value().clone()).collect();
        self.agents.clear();
        for handle in handles {
            handle.terminate().await;
        }
        self.cancellation_token.cancel();
    }
}
