// src/broadcast.rs
//
// Save/discard broadcasting to the camera-station HTTP clients. The
// trigger thread never waits on the network: requests are dispatched
// through a transport seam and completion lands via callbacks that
// maintain the busy/ready accounting.

use crate::error::CaptureError;
use crate::hardware::LocalCameraLink;
use crate::types::{BroadcastConfig, ClientEndpoint};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Asynchronous HTTP seam. Implementations invoke the callback exactly
/// once, from any thread, when the request completes.
pub trait SaveTransport: Send + Sync {
    fn dispatch(&self, url: String, done: Box<dyn FnOnce(bool) + Send>);
    fn fetch(&self, url: String, done: Box<dyn FnOnce(Option<String>) + Send>);
}

/// Transport backed by `reqwest` on the shared tokio runtime.
pub struct HttpTransport {
    handle: tokio::runtime::Handle,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(handle: tokio::runtime::Handle, timeout_secs: u64) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CaptureError::Broadcast(e.to_string()))?;
        Ok(Self { handle, client })
    }
}

impl SaveTransport for HttpTransport {
    fn dispatch(&self, url: String, done: Box<dyn FnOnce(bool) + Send>) {
        let client = self.client.clone();
        self.handle.spawn(async move {
            let ok = match client.get(&url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(e) => {
                    warn!("Request to {} failed: {}", url, e);
                    false
                }
            };
            done(ok);
        });
    }

    fn fetch(&self, url: String, done: Box<dyn FnOnce(Option<String>) + Send>) {
        let client = self.client.clone();
        self.handle.spawn(async move {
            let body = match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
                Ok(resp) => {
                    warn!("Request to {} returned {}", url, resp.status());
                    None
                }
                Err(e) => {
                    warn!("Request to {} failed: {}", url, e);
                    None
                }
            };
            done(body);
        });
    }
}

/// One registered camera station.
pub struct ClientRegistration {
    pub endpoint: ClientEndpoint,
    pub camera_count: AtomicU32,
    pub ready: AtomicBool,
}

/// Percent-encode an output prefix into a single URL path segment, the
/// way the camera stations expect it.
pub fn encode_prefix(prefix: &str) -> String {
    prefix
        .replace('\\', "/")
        .replace(' ', "%20")
        .replace('/', "%2f")
}

pub struct SaveBroadcaster {
    cfg: BroadcastConfig,
    transport: Arc<dyn SaveTransport>,
    local: Arc<dyn LocalCameraLink>,
    clients: Vec<Arc<ClientRegistration>>,
    /// In-flight save requests across all clients and broadcasts.
    busy: Arc<AtomicI32>,
    failures: Arc<AtomicU64>,
    broadcasts_completed: Arc<AtomicU64>,
}

impl SaveBroadcaster {
    pub fn new(
        cfg: BroadcastConfig,
        transport: Arc<dyn SaveTransport>,
        local: Arc<dyn LocalCameraLink>,
        failures: Arc<AtomicU64>,
    ) -> Self {
        let clients = cfg
            .clients
            .iter()
            .map(|endpoint| {
                Arc::new(ClientRegistration {
                    endpoint: endpoint.clone(),
                    camera_count: AtomicU32::new(0),
                    ready: AtomicBool::new(false),
                })
            })
            .collect();
        Self {
            cfg,
            transport,
            local,
            clients,
            busy: Arc::new(AtomicI32::new(0)),
            failures,
            broadcasts_completed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn number_busy(&self) -> i32 {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn broadcasts_completed(&self) -> u64 {
        self.broadcasts_completed.load(Ordering::SeqCst)
    }

    pub fn clients(&self) -> &[Arc<ClientRegistration>] {
        &self.clients
    }

    fn use_clients(&self) -> bool {
        self.cfg.use_clients && !self.clients.is_empty()
    }

    /// Ask every camera station for its camera count; a client becomes
    /// ready once it answers. Unready clients are re-probed by the
    /// periodic status pass, so startup never blocks on them.
    pub fn probe_clients(&self) {
        for client in &self.clients {
            if client.ready.load(Ordering::SeqCst) {
                continue;
            }
            let url = format!("{}/camera_count", client.endpoint.base_url());
            let registration = Arc::clone(client);
            self.transport.fetch(
                url,
                Box::new(move |body| match body.and_then(|b| b.trim().parse::<u32>().ok()) {
                    Some(count) => {
                        registration.camera_count.store(count, Ordering::SeqCst);
                        registration.ready.store(true, Ordering::SeqCst);
                        info!(
                            "Client {} ready with {} cameras",
                            registration.endpoint.base_url(),
                            count
                        );
                    }
                    None => {
                        warn!(
                            "Client {} not answering camera_count probe",
                            registration.endpoint.base_url()
                        );
                    }
                }),
            );
        }
    }

    /// Broadcast a save (`commit`) or discard to every client, or route
    /// to the local camera subsystem when no clients are in use.
    pub fn save_to_disk(&self, commit: bool, prefix: &str, start_time_ago: f32, end_time_ago: f32) {
        if !self.use_clients() {
            if commit {
                self.local.save(prefix, start_time_ago, end_time_ago);
            } else {
                self.local.abort_save();
            }
            return;
        }

        let action = if commit { "save" } else { "abortsave" };
        let encoded = encode_prefix(prefix);
        let remaining = Arc::new(AtomicI32::new(self.clients.len() as i32));

        for client in &self.clients {
            let url = format!(
                "{}/save/{}/{}/{}/{}",
                client.endpoint.base_url(),
                encoded,
                action,
                start_time_ago,
                end_time_ago
            );
            self.busy.fetch_add(1, Ordering::SeqCst);
            info!("Dispatching {} to {}", action, url);

            let busy = Arc::clone(&self.busy);
            let failures = Arc::clone(&self.failures);
            let completed = Arc::clone(&self.broadcasts_completed);
            let remaining = Arc::clone(&remaining);
            let registration = Arc::clone(client);
            self.transport.dispatch(
                url,
                Box::new(move |ok| {
                    busy.fetch_sub(1, Ordering::SeqCst);
                    if !ok {
                        registration.ready.store(false, Ordering::SeqCst);
                        failures.fetch_add(1, Ordering::SeqCst);
                        warn!(
                            "Save request to {} failed; client marked not ready",
                            registration.endpoint.base_url()
                        );
                    }
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        completed.fetch_add(1, Ordering::SeqCst);
                        info!("📷 All clients responded, ready for next capture");
                    }
                }),
            );
        }
    }
}
