//! Host and remote fakes that print to the console.

use async_trait::async_trait;
use parking_lot::Mutex;
use pushsync::push::{
    ClientDirectory, ClientInfo, DefaultDelivery, NotificationDisplay, NotificationOptions,
    Permission, PermissionProbe, RawPush,
};
use pushsync::refresh::{RefreshKind, RemoteStateSource};
use pushsync::{AckFailure, Result};
use tracing::debug;

pub struct ConsoleHost {
    permission: Permission,
    clients: Mutex<Vec<ClientInfo>>,
    last_shown: Mutex<Option<(String, NotificationOptions)>>,
}

impl ConsoleHost {
    pub fn new(permission: Permission, client_urls: &[String]) -> Self {
        let clients = client_urls
            .iter()
            .enumerate()
            .map(|(i, url)| ClientInfo::new(format!("client-{}", i + 1), url.clone()))
            .collect();
        Self {
            permission,
            clients: Mutex::new(clients),
            last_shown: Mutex::new(None),
        }
    }

    /// The most recent notification shown, with its options.
    pub fn last_shown(&self) -> Option<(String, NotificationOptions)> {
        self.last_shown.lock().clone()
    }
}

#[async_trait]
impl NotificationDisplay for ConsoleHost {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        println!("[display] {title}");
        println!("{}", serde_json::to_string_pretty(options)?);
        *self.last_shown.lock() = Some((title.to_string(), options.clone()));
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        println!("[display] closed {tag}");
        Ok(())
    }
}

impl PermissionProbe for ConsoleHost {
    fn permission(&self) -> Permission {
        self.permission
    }
}

#[async_trait]
impl DefaultDelivery for ConsoleHost {
    async fn deliver(&self, message: &RawPush) {
        println!(
            "[default delivery] {}",
            message.preview().unwrap_or_else(|| "<empty>".to_string())
        );
    }
}

#[async_trait]
impl ClientDirectory for ConsoleHost {
    async fn match_all(&self) -> Result<Vec<ClientInfo>> {
        Ok(self.clients.lock().clone())
    }

    async fn navigate(&self, client_id: &str, url: &str) -> Result<()> {
        println!("[clients] navigate {client_id} -> {url}");
        if let Some(client) = self.clients.lock().iter_mut().find(|c| c.id == client_id) {
            client.url = url.to_string();
        }
        Ok(())
    }

    async fn focus(&self, client_id: &str) -> Result<()> {
        println!("[clients] focus {client_id}");
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        println!("[clients] open {url}");
        let mut clients = self.clients.lock();
        let id = format!("client-{}", clients.len() + 1);
        clients.push(ClientInfo::new(id, url));
        Ok(())
    }

    async fn claim(&self) -> Result<()> {
        debug!("Console host claimed clients");
        Ok(())
    }
}

/// Acknowledgment channel that either always succeeds or always fails.
pub struct ConsoleSource {
    failure: Option<AckFailure>,
}

impl ConsoleSource {
    pub fn new(failure: Option<AckFailure>) -> Self {
        Self { failure }
    }
}

#[async_trait]
impl RemoteStateSource for ConsoleSource {
    async fn request_refresh(&self, kind: RefreshKind) -> std::result::Result<(), AckFailure> {
        println!("[remote] refresh requested: {kind}");
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}
