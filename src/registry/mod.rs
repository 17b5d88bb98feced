//! The model registry: validated CRUD over the in-memory store, with every
//! mutation followed by a fresh health probe.

mod store;
mod types;

pub use store::RegistryStore;
pub use types::{
    EntryFields, EntryUpdate, GenerationParams, HealthStatus, NewEntry, RegistryEntry,
    DEFAULT_PROBE_TIMEOUT_MS,
};

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::probe::HealthProber;

#[derive(Clone)]
pub struct RegistryService {
    store: RegistryStore,
    prober: HealthProber,
}

impl RegistryService {
    pub fn new(store: RegistryStore, prober: HealthProber) -> Self {
        Self { store, prober }
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Re-probes every entry concurrently, records the outcomes, and returns
    /// the entries in insertion order.
    pub async fn refresh_all(&self) -> Vec<RegistryEntry> {
        let snapshot = self.store.list().await;
        let outcomes = join_all(snapshot.into_iter().map(|entry| async move {
            let status = self.prober.probe(&entry).await;
            (entry.id, status, Utc::now())
        }))
        .await;

        self.store.record_statuses(&outcomes).await;
        self.store.list().await
    }

    pub async fn create(&self, new_entry: NewEntry) -> Result<RegistryEntry> {
        let fields = new_entry.validate()?;
        let now = Utc::now();
        let mut entry = RegistryEntry {
            id: Uuid::new_v4().to_string(),
            display_name: fields.display_name,
            kind: fields.kind,
            endpoint_url: fields.endpoint_url,
            auth_token: fields.auth_token,
            generation_defaults: fields.generation_defaults,
            last_known_status: HealthStatus::Offline,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        };

        entry.last_known_status = self.prober.probe(&entry).await;
        entry.last_checked_at = Some(Utc::now());

        let entry = self.store.insert(entry).await?;
        tracing::info!(
            registry_id = %entry.id,
            kind = %entry.kind,
            endpoint = %entry.endpoint_url,
            status = %entry.last_known_status,
            "registry entry created"
        );
        Ok(entry)
    }

    pub async fn update(&self, update: EntryUpdate) -> Result<RegistryEntry> {
        let id = update.id.trim().to_string();
        let existing = self
            .store
            .get(&id)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("registry entry '{}' not found", id)))?;

        let keep_token = update.fields.auth_token.is_none();
        let fields = update.fields.validate()?;

        let updated = RegistryEntry {
            id,
            display_name: fields.display_name,
            kind: fields.kind,
            endpoint_url: fields.endpoint_url,
            auth_token: if keep_token { existing.auth_token } else { fields.auth_token },
            generation_defaults: fields.generation_defaults,
            last_known_status: existing.last_known_status,
            last_checked_at: existing.last_checked_at,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        let mut updated = self.store.replace(updated).await?;

        let status = self.prober.probe(&updated).await;
        let checked_at = Utc::now();
        match self.store.record_status(&updated.id, status, checked_at).await {
            Some(stored) => updated = stored,
            None => {
                updated.last_known_status = status;
                updated.last_checked_at = Some(checked_at);
            }
        }

        tracing::info!(registry_id = %updated.id, status = %updated.last_known_status, "registry entry updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) {
        if self.store.remove(id).await {
            tracing::info!(registry_id = %id, "registry entry deleted");
        } else {
            tracing::debug!(registry_id = %id, "delete of unknown registry entry ignored");
        }
    }
}
