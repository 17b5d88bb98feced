use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::{wrappers::IntervalStream, StreamExt};

use crate::registry::{HealthStatus, RegistryService};

/// Re-probes every registry entry once per `every`. The first pass runs one
/// period after startup.
pub fn spawn_status_refresher(registry: RegistryService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(ticker);

        tracing::info!(interval_secs = every.as_secs(), "status refresher started");
        while ticks.next().await.is_some() {
            let entries = registry.refresh_all().await;
            let online = entries
                .iter()
                .filter(|e| e.last_known_status == HealthStatus::Online)
                .count();
            tracing::debug!(total = entries.len(), online, "registry statuses refreshed");
        }
    })
}
