//! Flow-scope store.
//!
//! Front-channel progress has to survive a browser round trip that may land
//! on another node, so it lives in a caller-provided store rather than in
//! process memory. Entries carry a TTL: a browser that abandons the
//! sequence leaves its cursor behind, and the store must let it lapse.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::SloResult;

/// Key-value store scoped to a browser flow.
#[async_trait]
pub trait FlowScopeStore: Send + Sync {
    /// Stores a value, replacing any previous one.
    ///
    /// The value must not be returned by `get` once `ttl` has elapsed.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> SloResult<()>;

    /// Reads a value.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> SloResult<Option<String>>;

    /// Removes a value.
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    async fn remove(&self, key: &str) -> SloResult<()>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process store for single-node deployments and tests.
///
/// Expired entries are dropped when read and swept on every write.
#[derive(Debug, Default)]
pub struct InMemoryFlowScopeStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryFlowScopeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Checks if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

#[async_trait]
impl FlowScopeStore for InMemoryFlowScopeStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> SloResult<()> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        let mut entries = self.entries.write();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> SloResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        tracing::debug!(key, "Dropping expired flow-scope entry");
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn remove(&self, key: &str) -> SloResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
