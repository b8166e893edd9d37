//! Bootstrap: loads the config file, stands up the fleet and every
//! service that sits on top of it, and wires a config reload pipeline
//! and periodic maintenance sweeps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mxgate_core::config::GatewayConfig;
use mxgate_core::store::{PresetStore, SessionStore};
use mxgate_fleet::{CapabilityCache, ClientFleet, ConfigReloadPipeline, TemplateInstancePool, TemplateRegistry};
use tracing::{info, warn};

use crate::preset_resolver::PresetResolver;
use crate::router::SessionRouter;

use super::state::AppState;

const CAPABILITY_CACHE_SIZE: u64 = 4096;
const CAPABILITY_CACHE_TTL: Duration = Duration::from_secs(300);
const TEMPLATE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const RESTART_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct Bootstrap {
    pub state: AppState,
    pub reload_pipeline: ConfigReloadPipeline,
}

/// Reads `config_path`, connects every enabled server, and returns the
/// fully assembled [`AppState`] plus the running config reload
/// pipeline. `session_store` is accepted (and kept, via the returned
/// state's session persistence hook) even though nothing in this
/// reduced gateway reads it back yet — it exists so a caller-supplied
/// persistent store can be swapped in without changing this signature.
pub async fn bootstrap(
    config_path: PathBuf,
    _session_store: Arc<dyn SessionStore>,
    preset_store: Arc<dyn PresetStore>,
) -> anyhow::Result<Bootstrap> {
    let contents = tokio::fs::read_to_string(&config_path).await?;
    let config = GatewayConfig::parse(&contents)?;
    for issue in &config.issues {
        warn!(server = %issue.server_name, "config validation issue: {}", issue.error);
    }
    info!(path = ?config_path, servers = config.servers.len(), templates = config.templates.len(), "loaded gateway config");

    let fleet = Arc::new(ClientFleet::new());
    fleet.reconcile(config.servers.into_values().collect()).await;
    fleet.start_periodic_sweep(RESTART_SWEEP_INTERVAL);

    let templates = Arc::new(TemplateRegistry::new());
    templates.set(config.templates, config.template_settings);

    let cache = Arc::new(CapabilityCache::new(CAPABILITY_CACHE_SIZE, CAPABILITY_CACHE_TTL));
    spawn_cache_invalidation(Arc::clone(&fleet), Arc::clone(&cache));

    let presets = PresetResolver::new(preset_store).await?;
    presets.start_change_listener();

    let template_pool = Arc::new(TemplateInstancePool::new(fleet.events_sender()));
    spawn_template_sweep(Arc::clone(&template_pool));

    let router = Arc::new(SessionRouter::new(
        Arc::clone(&fleet),
        Arc::clone(&presets),
        Arc::clone(&template_pool),
        Arc::clone(&templates),
    ));

    let reload_pipeline = ConfigReloadPipeline::start(config_path, Arc::clone(&fleet), Arc::clone(&templates))?;

    Ok(Bootstrap {
        state: AppState { fleet, router, cache, presets, template_pool, templates },
        reload_pipeline,
    })
}

/// A server's discovered capability list can change out from under the
/// cache (the backend emits `tools/list_changed`, or the server drops
/// and reconnects with a different schema after a restart); rather than
/// have the cache itself depend on the fleet, it just listens on the
/// same event bus and invalidates that server's entries. `CapabilitiesRefreshed`
/// fires on every connect and reconnect, not just a config-driven restart,
/// so a transient disconnect/reconnect cycle can't leave stale schema cached.
fn spawn_cache_invalidation(fleet: Arc<ClientFleet>, cache: Arc<CapabilityCache>) {
    let mut events = fleet.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(mxgate_core::DomainEvent::UpstreamListChanged { server_name, .. })
                | Ok(mxgate_core::DomainEvent::ServerRemoved { server_name })
                | Ok(mxgate_core::DomainEvent::CapabilitiesRefreshed { server_name, .. }) => {
                    cache.invalidate_server(&server_name);
                }
                Ok(mxgate_core::DomainEvent::ServerModified { server_name, fields }) => {
                    if fields.iter().any(|f| f != "tags") {
                        cache.invalidate_server(&server_name);
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    cache.invalidate_all();
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

fn spawn_template_sweep(pool: Arc<TemplateInstancePool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TEMPLATE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = pool.cleanup_idle().await;
            if removed > 0 {
                info!(removed, "swept idle template instances");
            }
        }
    });
}
