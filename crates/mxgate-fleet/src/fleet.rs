//! Client Fleet (C3): owns every `OutboundClient`, reconciles the live
//! set against a new config snapshot, and bounds how many servers
//! connect in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mxgate_core::{ConnectionStatus, DomainEvent, RestartPolicy, ServerSpec, TransportSpec};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::OutboundClient;
use crate::transport::{self, TransportConnectResult, TransportFactory};

/// Mirrors `ServerSpec::restart_policy` defaults when sizing the worker
/// pool: at least 4 concurrent connect attempts, scaling with available
/// cores for larger fleets.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(4)
}

/// Per-server count of restart attempts since the last successful
/// connect, used to compute backoff and to give up after
/// `RestartPolicy::max_attempts`.
#[derive(Default)]
struct RestartState {
    attempts: AtomicUsize,
}

pub struct ClientFleet {
    clients: DashMap<String, Arc<OutboundClient>>,
    restarts: DashMap<String, Arc<RestartState>>,
    pending_auth_tokens: DashMap<String, String>,
    events: broadcast::Sender<DomainEvent>,
    connect_semaphore: Arc<Semaphore>,
}

impl ClientFleet {
    pub fn new() -> Self {
        Self::with_worker_count(default_worker_count())
    }

    pub fn with_worker_count(workers: usize) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            clients: DashMap::new(),
            restarts: DashMap::new(),
            pending_auth_tokens: DashMap::new(),
            events,
            connect_semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// A clone of the fleet's own event sender, for components (the
    /// template instance pool, the capability cache invalidator) that
    /// need to emit onto the same bus their outbound clients report to.
    pub fn events_sender(&self) -> broadcast::Sender<DomainEvent> {
        self.events.clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<OutboundClient>> {
        self.clients.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn get_all(&self) -> Vec<Arc<OutboundClient>> {
        self.clients.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn ready_servers(&self) -> Vec<Arc<OutboundClient>> {
        self.get_all().into_iter().filter(|c| c.is_ready()).collect()
    }

    /// Diff a freshly loaded config snapshot against the current fleet
    /// and apply the minimal set of changes: new specs are added and
    /// connected, removed specs are stopped and dropped, and modified
    /// specs are either updated in place (tags/disabled only) or
    /// restarted (anything affecting the connection itself).
    pub async fn reconcile(self: &Arc<Self>, specs: Vec<ServerSpec>) {
        let incoming: HashMap<String, ServerSpec> =
            specs.into_iter().map(|s| (s.name.clone(), s)).collect();

        let current_names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();

        for name in &current_names {
            if !incoming.contains_key(name) {
                self.remove(name).await;
            }
        }

        let mut to_start = Vec::new();
        for (name, spec) in incoming {
            match self.clients.get(&name) {
                None => {
                    to_start.push(spec);
                }
                Some(existing) => {
                    let previous: Arc<ServerSpec> = existing.spec.read().clone();
                    let fields = changed_fields(&previous, &spec);
                    if fields.is_empty() {
                        continue;
                    }
                    let spec = Arc::new(spec);
                    if connection_relevant_change(&previous, &spec) || previous.disabled != spec.disabled {
                        drop(existing);
                        self.restart(spec, fields).await;
                    } else {
                        existing.update_spec_in_place(Arc::clone(&spec));
                        let _ = self.events.send(DomainEvent::ServerModified { server_name: name, fields });
                    }
                }
            }
        }

        self.start_all(to_start).await;
    }

    async fn remove(&self, name: &str) {
        if let Some((_, client)) = self.clients.remove(name) {
            let flow_id = client.begin_flow();
            client.mark_stopped(flow_id);
            let _ = self.events.send(DomainEvent::ServerRemoved {
                server_name: name.to_string(),
            });
        }
        self.restarts.remove(name);
        self.pending_auth_tokens.remove(name);
    }

    /// Start every spec in parallel, bounded by `connect_semaphore`.
    pub async fn start_all(self: &Arc<Self>, specs: Vec<ServerSpec>) {
        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let fleet = Arc::clone(self);
            let spec = Arc::new(spec);
            handles.push(tokio::spawn(async move {
                fleet.start_one(spec).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn start_one(self: &Arc<Self>, spec: Arc<ServerSpec>) {
        let name = spec.name.clone();
        let client = Arc::new(OutboundClient::new(Arc::clone(&spec), self.events.clone()));
        self.clients.insert(name.clone(), Arc::clone(&client));
        let _ = self.events.send(DomainEvent::ServerAdded { server_name: name.clone() });

        if spec.disabled {
            return;
        }

        self.connect(client).await;
    }

    async fn connect(self: &Arc<Self>, client: Arc<OutboundClient>) {
        let _permit = self.connect_semaphore.acquire().await;
        let flow_id = client.begin_flow();
        client.mark_connecting(flow_id);

        let spec = client.spec.read().clone();
        let name = spec.name.clone();
        let auth_token = self.pending_auth_tokens.get(&name).map(|e| e.value().clone());
        let transport = TransportFactory::create(&spec, auth_token, self.events.clone());

        debug!(server = %name, transport = transport.transport_type(), "connecting");
        match transport.connect().await {
            TransportConnectResult::Connected { client: mcp_client, tools, prompts, resources } => {
                info!(server = %name, tools = tools.len(), "server ready");
                self.pending_auth_tokens.remove(&name);
                self.reset_restarts(&name);
                client.mark_ready(
                    flow_id,
                    mcp_client,
                    mxgate_core::DiscoveredCapabilities { tools, prompts, resources },
                );
            }
            TransportConnectResult::OAuthRequired { auth_url } => {
                info!(server = %name, "awaiting auth");
                client.mark_awaiting_auth(flow_id, auth_url);
            }
            TransportConnectResult::Failed(message) => {
                warn!(server = %name, "connect failed: {message}");
                client.mark_error(flow_id, message);
                self.schedule_restart(Arc::clone(&client), spec);
            }
        }
    }

    fn reset_restarts(&self, name: &str) {
        if let Some(state) = self.restarts.get(name) {
            state.attempts.store(0, Ordering::SeqCst);
        }
    }

    fn schedule_restart(self: &Arc<Self>, client: Arc<OutboundClient>, spec: Arc<ServerSpec>) {
        let policy: RestartPolicy = spec.restart_policy.clone();
        if !policy.enabled {
            return;
        }
        let state = self
            .restarts
            .entry(spec.name.clone())
            .or_insert_with(|| Arc::new(RestartState::default()))
            .clone();
        let attempt = state.attempts.fetch_add(1, Ordering::SeqCst) as u32;
        if attempt >= policy.max_attempts {
            warn!(server = %spec.name, attempt, "giving up after max restart attempts");
            return;
        }

        let delay = policy.backoff_for_attempt(attempt);
        let fleet = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fleet.clients.contains_key(&spec.name) {
                fleet.connect(client).await;
            }
        });
    }

    /// Replace a server's spec entirely and reconnect (or, for a
    /// disabled spec, leave unconnected), used when a config reload
    /// changes anything beyond tags: a transport/timeout change, or a
    /// `disabled` flip in either direction, always destroys the old
    /// `OutboundClient` and creates a fresh one.
    pub async fn restart(self: &Arc<Self>, spec: Arc<ServerSpec>, fields: Vec<String>) {
        let name = spec.name.clone();
        if let Some((_, old)) = self.clients.remove(&name) {
            let flow_id = old.begin_flow();
            old.mark_stopped(flow_id);
        }
        let client = Arc::new(OutboundClient::new(Arc::clone(&spec), self.events.clone()));
        self.clients.insert(name.clone(), Arc::clone(&client));
        let _ = self.events.send(DomainEvent::ServerModified { server_name: name, fields });
        if !spec.disabled {
            self.connect(client).await;
        }
    }

    /// Completes the OAuth gate: stores the externally obtained token
    /// and retries the connection for `server_name`.
    pub async fn complete_oauth_and_reconnect(
        self: &Arc<Self>,
        server_name: &str,
        auth_code: String,
    ) -> Result<(), String> {
        let client = self
            .get(server_name)
            .ok_or_else(|| format!("unknown server '{server_name}'"))?;
        if client.status() != ConnectionStatus::AwaitingAuth {
            return Err(format!("server '{server_name}' is not awaiting auth"));
        }
        self.pending_auth_tokens.insert(server_name.to_string(), auth_code);
        self.connect(client).await;
        Ok(())
    }

    pub fn config_hash_of(&self, name: &str) -> Option<u64> {
        self.clients.get(name).map(|c| transport::config_hash(&c.spec.read()))
    }

    /// Spawns a background loop that reconnects any server stuck in
    /// `Error` once its backoff window elapses. `schedule_restart`
    /// already does this per-failure; this is the periodic safety net
    /// for servers whose restart budget was exhausted but whose spec is
    /// still enabled.
    pub fn start_periodic_sweep(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let fleet = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for client in fleet.get_all() {
                    if client.status() == ConnectionStatus::Error {
                        let name = client.name();
                        if let Some(state) = fleet.restarts.get(&name) {
                            state.attempts.store(0, Ordering::SeqCst);
                        }
                        fleet.connect(client).await;
                    }
                }
            }
        })
    }
}

impl Default for ClientFleet {
    fn default() -> Self {
        Self::new()
    }
}

fn connection_relevant_change(previous: &ServerSpec, next: &ServerSpec) -> bool {
    transport::config_hash(previous) != transport::config_hash(next)
        || previous.connect_timeout_secs != next.connect_timeout_secs
        || previous.request_timeout_secs != next.request_timeout_secs
}

/// Names every top-level field that differs between `previous` and
/// `next`, for the `MODIFIED(fields=[…])` diff a config reload reports.
/// An empty result means the two specs are equivalent for reconcile
/// purposes (no event is emitted, no action taken).
fn changed_fields(previous: &ServerSpec, next: &ServerSpec) -> Vec<String> {
    let mut fields = Vec::new();
    match (&previous.transport, &next.transport) {
        (
            TransportSpec::Stdio { command: pc, args: pa, env: pe, cwd: pcwd },
            TransportSpec::Stdio { command: nc, args: na, env: ne, cwd: ncwd },
        ) => {
            if pc != nc {
                fields.push("command".to_string());
            }
            if pa != na {
                fields.push("args".to_string());
            }
            if pe != ne {
                fields.push("env".to_string());
            }
            if pcwd != ncwd {
                fields.push("cwd".to_string());
            }
        }
        (
            TransportSpec::Http { url: pu, headers: ph, sse: ps },
            TransportSpec::Http { url: nu, headers: nh, sse: ns },
        ) => {
            if pu != nu {
                fields.push("url".to_string());
            }
            if ph != nh {
                fields.push("headers".to_string());
            }
            if ps != ns {
                fields.push("sse".to_string());
            }
        }
        _ => fields.push("transport".to_string()),
    }
    if previous.connect_timeout_secs != next.connect_timeout_secs {
        fields.push("connect_timeout_secs".to_string());
    }
    if previous.request_timeout_secs != next.request_timeout_secs {
        fields.push("request_timeout_secs".to_string());
    }
    if previous.tags != next.tags {
        fields.push("tags".to_string());
    }
    if previous.disabled != next.disabled {
        fields.push("disabled".to_string());
    }
    fields
}
