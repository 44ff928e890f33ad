#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pushsync::push::{
    AgentConfig, AgentHandle, ClientDirectory, ClientInfo, DefaultDelivery, NotificationDisplay,
    NotificationOptions, Permission, PermissionProbe, PushHost, PushInterceptionAgent, RawPush,
};
use pushsync::refresh::{RefreshKind, RemoteStateSource};
use pushsync::{AckFailure, Error, EventLog, Result};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const ORIGIN: &str = "https://app.example";

/// Host fake that records every call made through the capability traits.
pub struct RecordingHost {
    permission: Mutex<Permission>,
    fail_display: AtomicBool,
    clients: Mutex<Vec<ClientInfo>>,
    pub shown: Mutex<Vec<(String, NotificationOptions)>>,
    pub closed: Mutex<Vec<String>>,
    pub delivered: Mutex<Vec<RawPush>>,
    /// Client directory calls in order, e.g. `navigate:c1:https://...`.
    pub client_calls: Mutex<Vec<String>>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            permission: Mutex::new(Permission::Granted),
            fail_display: AtomicBool::new(false),
            clients: Mutex::new(Vec::new()),
            shown: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            client_calls: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock() = permission;
    }

    pub fn fail_display(&self, fail: bool) {
        self.fail_display.store(fail, Ordering::SeqCst);
    }

    pub fn open_client(&self, id: &str, url: &str) {
        self.clients.lock().push(ClientInfo::new(id, url));
    }

    pub fn shown(&self) -> Vec<(String, NotificationOptions)> {
        self.shown.lock().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }

    pub fn client_calls(&self) -> Vec<String> {
        self.client_calls.lock().clone()
    }

    /// Client calls other than `match_all` and `claim`.
    pub fn routing_calls(&self) -> Vec<String> {
        self.client_calls()
            .into_iter()
            .filter(|c| c != "match_all" && c != "claim")
            .collect()
    }

    pub fn host(self: &Arc<Self>) -> PushHost {
        PushHost::new(self.clone(), self.clone(), self.clone(), self.clone())
    }
}

#[async_trait]
impl NotificationDisplay for RecordingHost {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(Error::render("display capability unavailable"));
        }
        self.shown.lock().push((title.to_string(), options.clone()));
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        self.closed.lock().push(tag.to_string());
        Ok(())
    }
}

impl PermissionProbe for RecordingHost {
    fn permission(&self) -> Permission {
        *self.permission.lock()
    }
}

#[async_trait]
impl DefaultDelivery for RecordingHost {
    async fn deliver(&self, message: &RawPush) {
        self.delivered.lock().push(message.clone());
    }
}

#[async_trait]
impl ClientDirectory for RecordingHost {
    async fn match_all(&self) -> Result<Vec<ClientInfo>> {
        self.client_calls.lock().push("match_all".to_string());
        Ok(self.clients.lock().clone())
    }

    async fn navigate(&self, client_id: &str, url: &str) -> Result<()> {
        self.client_calls
            .lock()
            .push(format!("navigate:{client_id}:{url}"));
        Ok(())
    }

    async fn focus(&self, client_id: &str) -> Result<()> {
        self.client_calls.lock().push(format!("focus:{client_id}"));
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.client_calls.lock().push(format!("open:{url}"));
        Ok(())
    }

    async fn claim(&self) -> Result<()> {
        self.client_calls.lock().push("claim".to_string());
        Ok(())
    }
}

pub fn spawn_agent(host: &Arc<RecordingHost>, log: &EventLog) -> AgentHandle {
    spawn_agent_with_token(host, log, CancellationToken::new())
}

pub fn spawn_agent_with_token(
    host: &Arc<RecordingHost>,
    log: &EventLog,
    token: CancellationToken,
) -> AgentHandle {
    let config = AgentConfig::new(Url::parse(ORIGIN).unwrap());
    PushInterceptionAgent::spawn(config, host.host(), log.clone(), token)
}

/// Remote state service fake for the acknowledgment channel.
#[derive(Default)]
pub struct ScriptedSource {
    failure: Mutex<Option<AckFailure>>,
    calls: AtomicUsize,
    pub kinds: Mutex<Vec<RefreshKind>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failure: AckFailure) -> Arc<Self> {
        let source = Self::new();
        source.fail_with(Some(failure));
        source
    }

    pub fn fail_with(&self, failure: Option<AckFailure>) {
        *self.failure.lock() = failure;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStateSource for ScriptedSource {
    async fn request_refresh(&self, kind: RefreshKind) -> std::result::Result<(), AckFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.kinds.lock().push(kind);
        match self.failure.lock().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}
