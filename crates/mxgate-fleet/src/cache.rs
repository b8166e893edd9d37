//! Lazy capability cache (C4): backs the meta-tool layer's
//! `tool_list`/`tool_schema` calls with an LRU+TTL cache so a session
//! that never invokes `tool_invoke` never pays for an upstream
//! `tools/list` round trip it doesn't need.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use mxgate_core::CapabilityKind;
use serde::Serialize;

/// Qualified key for one cached capability entry: the owning server and
/// the item name within it (e.g. a single tool's schema).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityKey {
    pub server_name: String,
    pub kind: CapabilityKind,
    pub item_name: String,
}

impl CapabilityKey {
    pub fn new(server_name: impl Into<String>, kind: CapabilityKind, item_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            kind,
            item_name: item_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityEntry {
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_ratio: f64,
    pub size: u64,
    pub max_size: u64,
    pub valid_entries: u64,
    pub expired_entries: u64,
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self { hits: AtomicU64::new(0), misses: AtomicU64::new(0), expired: AtomicU64::new(0) }
    }
}

/// LRU cache of capability schemas with a TTL, keyed by
/// `(server_name, kind, item_name)`. Invalidated wholesale for a server
/// on reconnect or `list_changed`, since a fresh fetch is one call and
/// partial invalidation buys nothing here.
pub struct CapabilityCache {
    inner: Cache<CapabilityKey, Arc<CapabilityEntry>>,
    counters: Arc<Counters>,
    max_size: u64,
}

impl CapabilityCache {
    pub fn new(max_size: u64, ttl: Duration) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = Arc::clone(&counters);
        let inner = Cache::builder()
            .max_capacity(max_size)
            .time_to_live(ttl)
            .eviction_listener(move |_key, _value, cause| {
                if cause == moka::notification::RemovalCause::Expired {
                    listener_counters.expired.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();
        Self { inner, counters, max_size }
    }

    pub async fn get(&self, key: &CapabilityKey) -> Option<Arc<CapabilityEntry>> {
        match self.inner.get(key).await {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, key: CapabilityKey, entry: CapabilityEntry) {
        self.inner.insert(key, Arc::new(entry)).await;
    }

    /// Drops every cached entry for a server, used when it reconnects
    /// with possibly different tool schemas, or reports
    /// `list_changed`.
    pub fn invalidate_server(&self, server_name: &str) {
        let server_name = server_name.to_string();
        self.inner.invalidate_entries_if(move |k, _| k.server_name == server_name).ok();
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks().await;
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let valid_entries = self.inner.entry_count();
        CacheStats {
            hits,
            misses,
            total_requests: total,
            hit_ratio: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            size: valid_entries,
            max_size: self.max_size,
            valid_entries,
            expired_entries: self.counters.expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = CapabilityCache::new(100, Duration::from_secs(60));
        let key = CapabilityKey::new("srv", CapabilityKind::Tool, "echo");
        assert!(cache.get(&key).await.is_none());
        cache
            .insert(key.clone(), CapabilityEntry { description: None, input_schema: serde_json::json!({}) })
            .await;
        assert!(cache.get(&key).await.is_some());
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn invalidate_server_clears_only_its_entries() {
        let cache = CapabilityCache::new(100, Duration::from_secs(60));
        let a = CapabilityKey::new("a", CapabilityKind::Tool, "x");
        let b = CapabilityKey::new("b", CapabilityKind::Tool, "y");
        cache.insert(a.clone(), CapabilityEntry { description: None, input_schema: serde_json::json!({}) }).await;
        cache.insert(b.clone(), CapabilityEntry { description: None, input_schema: serde_json::json!({}) }).await;
        cache.invalidate_server("a");
        cache.inner.run_pending_tasks().await;
        assert!(cache.get(&a).await.is_none());
        assert!(cache.get(&b).await.is_some());
    }
}
