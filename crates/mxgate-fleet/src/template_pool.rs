//! Template Instance Pool (C8): shares one outbound connection across
//! every session that instantiates the same template with the same
//! effective config, keyed by a hash of the substituted spec.
//!
//! Mirrors the fleet's config-hash pooling idea but scoped to
//! per-instance refcounting and idle cleanup instead of
//! reconcile-driven lifecycle, since template instances are created and
//! torn down by session activity rather than config reloads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mxgate_core::ServerSpec;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::client::OutboundClient;
use crate::transport::{config_hash, TransportConnectResult, TransportFactory};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

struct PooledInstance {
    client: Arc<OutboundClient>,
    ref_count: usize,
    last_activity: Instant,
}

impl PooledInstance {
    fn is_idle(&self) -> bool {
        self.ref_count == 0
    }

    fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// A handle to a shared template instance. Dropping it does not
/// release the reference automatically — callers explicitly call
/// `TemplateInstancePool::release` when the session that requested the
/// instance disconnects, mirroring the pool's ref-counted lifecycle.
#[derive(Clone)]
pub struct TemplateInstanceHandle {
    pub hash_key: u64,
    pub client: Arc<OutboundClient>,
}

pub struct TemplateInstancePool {
    // A plain `Mutex` rather than an `RwLock`: `get_or_create` must hold
    // it across the upstream `connect()` await to close the
    // check-then-act gap a read-then-write pair would leave between
    // "no instance yet" and "instance inserted" — two sessions racing to
    // instantiate the same template would otherwise both dial a fresh
    // connection before either wins the insert.
    instances: Mutex<HashMap<u64, PooledInstance>>,
    idle_timeout: Duration,
    events: broadcast::Sender<mxgate_core::DomainEvent>,
}

impl TemplateInstancePool {
    pub fn new(events: broadcast::Sender<mxgate_core::DomainEvent>) -> Self {
        Self::with_idle_timeout(events, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(
        events: broadcast::Sender<mxgate_core::DomainEvent>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            idle_timeout,
            events,
        }
    }

    /// Returns a shared instance for `spec`, connecting a new one if no
    /// instance with the same `config_hash` exists yet. Holds the pool
    /// lock for the whole call, including the upstream connect, so two
    /// concurrent callers for the same template never both dial out.
    pub async fn get_or_create(&self, spec: Arc<ServerSpec>) -> TemplateInstanceHandle {
        let hash_key = config_hash(&spec);
        let mut instances = self.instances.lock().await;

        if let Some(entry) = instances.get_mut(&hash_key) {
            entry.ref_count += 1;
            entry.last_activity = Instant::now();
            debug!(hash_key, ref_count = entry.ref_count, "reusing template instance");
            return TemplateInstanceHandle { hash_key, client: Arc::clone(&entry.client) };
        }

        info!(server = %spec.name, hash_key, "creating new template instance");
        let client = Arc::new(OutboundClient::new(Arc::clone(&spec), self.events.clone()));
        let flow_id = client.begin_flow();
        client.mark_connecting(flow_id);

        let transport = TransportFactory::create(&spec, None, self.events.clone());
        match transport.connect().await {
            TransportConnectResult::Connected { client: mcp_client, tools, prompts, resources } => {
                client.mark_ready(
                    flow_id,
                    mcp_client,
                    mxgate_core::DiscoveredCapabilities { tools, prompts, resources },
                );
            }
            TransportConnectResult::OAuthRequired { auth_url } => {
                client.mark_awaiting_auth(flow_id, auth_url);
            }
            TransportConnectResult::Failed(message) => {
                client.mark_error(flow_id, message);
            }
        }

        instances.insert(
            hash_key,
            PooledInstance { client: Arc::clone(&client), ref_count: 1, last_activity: Instant::now() },
        );
        TemplateInstanceHandle { hash_key, client }
    }

    pub async fn release(&self, hash_key: u64) {
        let mut instances = self.instances.lock().await;
        if let Some(entry) = instances.get_mut(&hash_key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            entry.last_activity = Instant::now();
            debug!(hash_key, ref_count = entry.ref_count, "released template instance reference");
        }
    }

    /// Disconnects and drops every instance that has been idle (zero
    /// references) for longer than `idle_timeout`.
    pub async fn cleanup_idle(&self) -> usize {
        let mut instances = self.instances.lock().await;
        let to_remove: Vec<u64> = instances
            .iter()
            .filter(|(_, entry)| entry.is_idle() && entry.idle_duration() > self.idle_timeout)
            .map(|(key, _)| *key)
            .collect();

        let mut removed = 0;
        for key in to_remove {
            if let Some(entry) = instances.remove(&key) {
                let flow_id = entry.client.begin_flow();
                entry.client.mark_stopped(flow_id);
                removed += 1;
                info!(hash_key = key, "cleaned up idle template instance");
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_detection() {
        let pooled = PooledInstance {
            client: Arc::new(OutboundClient::new(
                Arc::new(test_spec()),
                broadcast::channel(8).0,
            )),
            ref_count: 0,
            last_activity: Instant::now(),
        };
        assert!(pooled.is_idle());
    }

    fn test_spec() -> ServerSpec {
        use mxgate_core::TransportSpec;
        ServerSpec {
            name: "pg".into(),
            tags: vec![],
            disabled: false,
            transport: TransportSpec::Http {
                url: "https://example.invalid".into(),
                headers: Default::default(),
                sse: false,
            },
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            restart_policy: Default::default(),
        }
    }
}
