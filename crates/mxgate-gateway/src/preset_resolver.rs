//! Preset Resolver (C9): keeps an in-process, synchronously readable
//! cache of named presets backed by the (async) `PresetStore` contract,
//! so the session router can resolve `preset=<name>` filtering without
//! going async on every tool/prompt/resource listing call.

use std::collections::HashMap;
use std::sync::Arc;

use mxgate_core::{DomainEvent, GatewayError, GatewayResult, Preset, TagQuery};
use mxgate_core::store::PresetStore;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct PresetResolver {
    store: Arc<dyn PresetStore>,
    cache: RwLock<HashMap<String, Preset>>,
}

impl PresetResolver {
    /// Loads every preset from the store into the local cache. Callers
    /// should also spawn [`Self::start_change_listener`] to keep the
    /// cache current as presets are edited out-of-band.
    pub async fn new(store: Arc<dyn PresetStore>) -> GatewayResult<Arc<Self>> {
        let presets = store.list().await?;
        let cache = presets.into_iter().map(|p| (p.name.clone(), p)).collect();
        Ok(Arc::new(Self { store, cache: RwLock::new(cache) }))
    }

    pub fn resolve(&self, name: &str) -> GatewayResult<TagQuery> {
        self.cache
            .read()
            .get(name)
            .map(|p| p.tag_query.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("preset '{name}'")))
    }

    pub fn get(&self, name: &str) -> Option<Preset> {
        self.cache.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<Preset> {
        self.cache.read().values().cloned().collect()
    }

    /// Background task that re-fetches a preset from the store whenever
    /// `DomainEvent::PresetChanged` fires, keeping the sync cache in
    /// sync with out-of-band edits (e.g. a preset file reload).
    pub fn start_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        let mut events = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(DomainEvent::PresetChanged { preset_name }) => {
                        match resolver.store.get(&preset_name).await {
                            Ok(Some(preset)) => {
                                debug!(preset = %preset_name, "preset cache refreshed");
                                resolver.cache.write().insert(preset_name, preset);
                            }
                            Ok(None) => {
                                resolver.cache.write().remove(&preset_name);
                            }
                            Err(e) => warn!(preset = %preset_name, "failed to refresh preset: {e}"),
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("preset change listener lagged by {n} events, reloading all presets");
                        if let Ok(presets) = resolver.store.list().await {
                            let mut cache = resolver.cache.write();
                            cache.clear();
                            cache.extend(presets.into_iter().map(|p| (p.name.clone(), p)));
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxgate_core::store::memory::shared_preset_store;
    use mxgate_core::PresetStrategy;

    #[tokio::test]
    async fn resolves_preset_loaded_at_construction() {
        let store = shared_preset_store();
        store.upsert(Preset {
            name: "prod".into(),
            strategy: PresetStrategy::SimpleOr,
            tag_query: TagQuery::Tag("prod".into()),
        });
        let resolver = PresetResolver::new(store).await.unwrap();
        assert!(resolver.resolve("prod").is_ok());
        assert!(resolver.resolve("missing").is_err());
    }

    #[tokio::test]
    async fn change_listener_picks_up_new_preset() {
        let store = shared_preset_store();
        let resolver = PresetResolver::new(store.clone()).await.unwrap();
        let _listener = resolver.start_change_listener();

        store.upsert(Preset {
            name: "staging".into(),
            strategy: PresetStrategy::SimpleOr,
            tag_query: TagQuery::Tag("staging".into()),
        });

        for _ in 0..20 {
            if resolver.resolve("staging").is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(resolver.resolve("staging").is_ok());
    }
}
