//! Cancellation registry for long-running commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, Result};

/// Maps caller-chosen keys to the cancellation token of an in-flight operation
#[derive(Default)]
pub struct CancelRegistry {
    entries: RwLock<HashMap<String, (u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` under `key`. Fails if the key is taken.
    pub fn add(&self, key: &str, token: CancellationToken) -> Result<u64> {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Err(BusError::CancelKeyExists(key.to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(key.to_string(), (id, token));
        debug!("[cancel] registered {}", key);
        Ok(id)
    }

    /// Register and return a guard that removes the entry on drop
    pub fn register(self: &Arc<Self>, key: &str, token: CancellationToken) -> Result<CancelGuard> {
        let id = self.add(key, token)?;
        Ok(CancelGuard {
            registry: self.clone(),
            key: key.to_string(),
            id,
        })
    }

    pub fn remove(&self, key: &str) -> Option<CancellationToken> {
        self.entries.write().remove(key).map(|(_, token)| token)
    }

    pub fn get(&self, key: &str) -> Option<CancellationToken> {
        self.entries.read().get(key).map(|(_, token)| token.clone())
    }

    /// Cancel and deregister the operation under `key`
    pub fn cancel(&self, key: &str) -> Result<()> {
        let token = self
            .remove(key)
            .ok_or_else(|| BusError::CancelKeyNotFound(key.to_string()))?;
        token.cancel();
        info!("[cancel] cancelled {}", key);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn remove_registration(&self, key: &str, id: u64) {
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|(current, _)| *current == id) {
            entries.remove(key);
        }
    }
}

/// Removes its registration when dropped, unless the key was reused since
pub struct CancelGuard {
    registry: Arc<CancelRegistry>,
    key: String,
    id: u64,
}

impl CancelGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.registry.remove_registration(&self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_duplicate_key() {
        let registry = CancelRegistry::new();
        registry.add("k", CancellationToken::new()).unwrap();
        let err = registry.add("k", CancellationToken::new()).unwrap_err();
        assert_eq!(err.to_string(), "cancel key k already exists");
    }

    #[test]
    fn test_cancel_invokes_and_removes() {
        let registry = CancelRegistry::new();
        let token = CancellationToken::new();
        registry.add("k", token.clone()).unwrap();

        registry.cancel("k").unwrap();
        assert!(token.is_cancelled());
        assert!(registry.get("k").is_none());

        let err = registry.cancel("k").unwrap_err();
        assert_eq!(err.to_string(), "cancel function not found for key k");
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let registry = Arc::new(CancelRegistry::new());
        {
            let _guard = registry.register("k", CancellationToken::new()).unwrap();
            assert!(registry.contains("k"));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_guard_keeps_newer_registration() {
        let registry = Arc::new(CancelRegistry::new());
        let guard = registry.register("k", CancellationToken::new()).unwrap();
        registry.cancel("k").unwrap();

        let newer = CancellationToken::new();
        registry.add("k", newer.clone()).unwrap();
        drop(guard);

        assert!(registry.contains("k"));
        registry.cancel("k").unwrap();
        assert!(newer.is_cancelled());
    }
}
