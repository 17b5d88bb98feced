//! Bounded-timeout reachability checks against registered backends.

use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::registry::{HealthStatus, RegistryEntry};

#[derive(Clone)]
pub struct HealthProber {
    client: Client,
}

impl HealthProber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Classifies one entry:
    /// - 2xx within the timeout is `online`
    /// - any other completed response is `error`
    /// - transport failures and timeouts are `offline`
    pub async fn probe(&self, entry: &RegistryEntry) -> HealthStatus {
        let url = entry.kind.health_url(&entry.endpoint_url);
        let budget = Duration::from_millis(entry.probe_timeout_ms());
        let started = Instant::now();

        let mut request = self.client.get(&url);
        if let Some(token) = entry.auth_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let status = match timeout(budget, request.send()).await {
            Ok(Ok(response)) if response.status().is_success() => HealthStatus::Online,
            Ok(Ok(response)) => {
                tracing::warn!(
                    registry_id = %entry.id,
                    url = %url,
                    status = response.status().as_u16(),
                    "health probe returned non-success status"
                );
                HealthStatus::Error
            }
            Ok(Err(e)) => {
                tracing::warn!(registry_id = %entry.id, url = %url, error = %e, "health probe failed");
                HealthStatus::Offline
            }
            Err(_) => {
                tracing::warn!(
                    registry_id = %entry.id,
                    url = %url,
                    timeout_ms = budget.as_millis() as u64,
                    "health probe timed out"
                );
                HealthStatus::Offline
            }
        };

        tracing::debug!(
            registry_id = %entry.id,
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "health probe finished"
        );
        status
    }
}
