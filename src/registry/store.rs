use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::{HealthStatus, RegistryEntry};
use crate::error::ApiError;

/// Process-lifetime, insertion-ordered collection of registry entries.
///
/// The lock is only ever held for the in-memory mutation itself; callers
/// probe backends before or after touching the store, never while holding it.
#[derive(Clone, Default)]
pub struct RegistryStore {
    entries: Arc<RwLock<Vec<RegistryEntry>>>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<RegistryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<RegistryEntry> {
        self.entries.read().await.iter().find(|e| e.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn insert(&self, entry: RegistryEntry) -> Result<RegistryEntry, ApiError> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(ApiError::Internal(format!(
                "registry entry '{}' already exists",
                entry.id
            )));
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    /// Replaces the entry with the same id, keeping its position.
    pub async fn replace(&self, entry: RegistryEntry) -> Result<RegistryEntry, ApiError> {
        let mut entries = self.entries.write().await;
        let slot = entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| ApiError::NotFound(format!("registry entry '{}' not found", entry.id)))?;
        *slot = entry.clone();
        Ok(entry)
    }

    /// Removes the entry if present. Returns whether anything was removed.
    pub async fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Records a probe outcome. Returns `None` when the entry has been
    /// deleted while the probe was in flight.
    pub async fn record_status(
        &self,
        id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Option<RegistryEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries.iter_mut().find(|e| e.id == id)?;
        entry.last_known_status = status;
        entry.last_checked_at = Some(checked_at);
        Some(entry.clone())
    }

    pub async fn record_statuses(&self, outcomes: &[(String, HealthStatus, DateTime<Utc>)]) {
        let mut entries = self.entries.write().await;
        for (id, status, checked_at) in outcomes {
            if let Some(entry) = entries.iter_mut().find(|e| &e.id == id) {
                entry.last_known_status = *status;
                entry.last_checked_at = Some(*checked_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::registry::types::GenerationParams;

    fn entry(id: &str) -> RegistryEntry {
        let now = Utc::now();
        RegistryEntry {
            id: id.to_string(),
            display_name: format!("entry {}", id),
            kind: BackendKind::Ollama,
            endpoint_url: "http://localhost:11434".to_string(),
            auth_token: None,
            generation_defaults: GenerationParams::default(),
            last_known_status: HealthStatus::Offline,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let store = RegistryStore::new();
        for id in ["c", "a", "b"] {
            store.insert(entry(id)).await.unwrap();
        }
        let ids: Vec<_> = store.list().await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn replace_unknown_id_is_not_found() {
        let store = RegistryStore::new();
        store.insert(entry("a")).await.unwrap();
        let err = store.replace(entry("zzz")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = RegistryStore::new();
        store.insert(entry("a")).await.unwrap();
        store.insert(entry("b")).await.unwrap();
        assert!(store.remove("a").await);
        assert!(!store.remove("a").await);
        let ids: Vec<_> = store.list().await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn status_of_deleted_entry_is_dropped() {
        let store = RegistryStore::new();
        store.insert(entry("a")).await.unwrap();
        store.remove("a").await;
        assert!(store
            .record_status("a", HealthStatus::Online, Utc::now())
            .await
            .is_none());
        assert!(store.is_empty().await);
    }
}
