//! Config Reload Pipeline (C7): watches the gateway config file for
//! changes, debounces rapid writes, reparses, and hands the new spec
//! set to the fleet's `reconcile`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mxgate_core::config::GatewayConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::fleet::ClientFleet;
use crate::template_registry::TemplateRegistry;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Watches a single config file and reconciles `ClientFleet` (and the
/// template registry) against it whenever it settles after an edit.
pub struct ConfigReloadPipeline {
    _watcher: RecommendedWatcher,
    config_path: PathBuf,
}

impl ConfigReloadPipeline {
    pub fn start(
        config_path: PathBuf,
        fleet: Arc<ClientFleet>,
        templates: Arc<TemplateRegistry>,
    ) -> notify::Result<Self> {
        Self::start_with_debounce(config_path, fleet, templates, DEFAULT_DEBOUNCE)
    }

    pub fn start_with_debounce(
        config_path: PathBuf,
        fleet: Arc<ClientFleet>,
        templates: Arc<TemplateRegistry>,
        debounce: Duration,
    ) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel::<PathBuf>(16);

        let watch_target = config_path.clone();
        tokio::spawn(Self::debounced_handler(rx, fleet, templates, watch_target.clone(), debounce));

        let tx_clone = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    for path in event.paths {
                        debug!(?path, "config file change detected");
                        if let Err(e) = tx_clone.blocking_send(path) {
                            warn!("failed to queue config reload: {e}");
                        }
                    }
                }
            }
            Err(e) => error!("config watcher error: {e}"),
        })?;

        let watch_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
        info!(path = ?config_path, "config reload pipeline started");

        Ok(Self { _watcher: watcher, config_path })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn debounced_handler(
        mut rx: mpsc::Receiver<PathBuf>,
        fleet: Arc<ClientFleet>,
        templates: Arc<TemplateRegistry>,
        target: PathBuf,
        debounce: Duration,
    ) {
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

        loop {
            tokio::select! {
                maybe_path = rx.recv() => {
                    match maybe_path {
                        Some(path) if path == target => {
                            pending.insert(path, Instant::now());
                        }
                        Some(_) => {}
                        None => return,
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    let now = Instant::now();
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, t)| now.duration_since(**t) >= debounce)
                        .map(|(p, _)| p.clone())
                        .collect();

                    for path in ready {
                        pending.remove(&path);
                        Self::reload_once(&path, &fleet, &templates).await;
                    }
                }
            }
        }
    }

    async fn reload_once(path: &Path, fleet: &Arc<ClientFleet>, templates: &Arc<TemplateRegistry>) {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => {
                error!(?path, "failed to read config on reload: {e}");
                return;
            }
        };

        let config = match GatewayConfig::parse(&contents) {
            Ok(c) => c,
            Err(e) => {
                error!(?path, "failed to parse config on reload: {e}");
                return;
            }
        };

        for issue in &config.issues {
            warn!(?path, server = %issue.server_name, "config validation issue: {}", issue.error);
        }

        templates.set(config.templates, config.template_settings);

        let servers: Vec<_> = config.servers.into_values().collect();
        info!(?path, servers = servers.len(), "reloading config");
        fleet.reconcile(servers).await;
    }
}
