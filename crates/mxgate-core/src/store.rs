//! Contracts for the two pieces of state the gateway treats as owned by
//! an external system rather than implementing itself: persisted
//! inbound sessions and named presets. The gateway only needs to read,
//! write and subscribe to these; the actual storage engine (a database,
//! a file, a remote service) is the caller's concern.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{GatewayResult, InboundSession, Preset};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session: &InboundSession) -> GatewayResult<()>;
    async fn get(&self, session_id: &str) -> GatewayResult<Option<InboundSession>>;
    async fn delete(&self, session_id: &str) -> GatewayResult<()>;
}

#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn get(&self, name: &str) -> GatewayResult<Option<Preset>>;
    async fn list(&self) -> GatewayResult<Vec<Preset>>;

    /// Notifies subscribers with `DomainEvent::PresetChanged` whenever a
    /// preset's tag query is edited out-of-band, so the Preset Resolver
    /// can trigger session recomputation.
    fn subscribe(&self) -> broadcast::Receiver<crate::domain::DomainEvent>;
}

/// In-memory reference implementations, useful for tests and for
/// running the gateway without a configured external store.
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::RwLock;
    use tokio::sync::broadcast;

    use super::*;
    use crate::domain::DomainEvent;

    #[derive(Default)]
    pub struct InMemorySessionStore {
        sessions: RwLock<HashMap<String, InboundSession>>,
    }

    #[async_trait]
    impl SessionStore for InMemorySessionStore {
        async fn put(&self, session: &InboundSession) -> GatewayResult<()> {
            self.sessions
                .write()
                .insert(session.session_id.clone(), session.clone());
            Ok(())
        }

        async fn get(&self, session_id: &str) -> GatewayResult<Option<InboundSession>> {
            Ok(self.sessions.read().get(session_id).cloned())
        }

        async fn delete(&self, session_id: &str) -> GatewayResult<()> {
            self.sessions.write().remove(session_id);
            Ok(())
        }
    }

    pub struct InMemoryPresetStore {
        presets: RwLock<HashMap<String, Preset>>,
        events: broadcast::Sender<DomainEvent>,
    }

    impl Default for InMemoryPresetStore {
        fn default() -> Self {
            let (events, _) = broadcast::channel(64);
            Self {
                presets: RwLock::new(HashMap::new()),
                events,
            }
        }
    }

    impl InMemoryPresetStore {
        pub fn upsert(&self, preset: Preset) {
            let name = preset.name.clone();
            self.presets.write().insert(name.clone(), preset);
            let _ = self.events.send(DomainEvent::PresetChanged { preset_name: name });
        }
    }

    #[async_trait]
    impl PresetStore for InMemoryPresetStore {
        async fn get(&self, name: &str) -> GatewayResult<Option<Preset>> {
            Ok(self.presets.read().get(name).cloned())
        }

        async fn list(&self) -> GatewayResult<Vec<Preset>> {
            Ok(self.presets.read().values().cloned().collect())
        }

        fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
            self.events.subscribe()
        }
    }

    pub fn shared_session_store() -> Arc<dyn SessionStore> {
        Arc::new(InMemorySessionStore::default())
    }

    pub fn shared_preset_store() -> Arc<InMemoryPresetStore> {
        Arc::new(InMemoryPresetStore::default())
    }
}

#[cfg(test)]
mod tests {
    use super::memory::*;
    use super::*;
    use crate::domain::{PresetStrategy, TagFilterMode, TagQuery};

    #[tokio::test]
    async fn session_store_roundtrips() {
        let store = InMemorySessionStore::default();
        let session = InboundSession::new("sess-1".into(), TagFilterMode::None);
        store.put(&session).await.unwrap();
        assert!(store.get("sess-1").await.unwrap().is_some());
        store.delete("sess-1").await.unwrap();
        assert!(store.get("sess-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn preset_store_notifies_on_change() {
        let store = InMemoryPresetStore::default();
        let mut rx = store.subscribe();
        store.upsert(Preset {
            name: "prod".into(),
            strategy: PresetStrategy::SimpleOr,
            tag_query: TagQuery::Tag("prod".into()),
        });
        let event = rx.recv().await.unwrap();
        matches!(event, crate::domain::DomainEvent::PresetChanged { .. });
    }
}
