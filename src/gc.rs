//! Periodic GC task (C12) — walks the health store at a configurable
//! interval and garbage-collects samples older than the retention
//! horizon.
//!
//! Grounded on the health-check background-loop shape: a `tokio::spawn`ed
//! loop ticking on an interval, iterating the tracked model set, and
//! logging transitions — adapted here from health-state polling to a
//! sweep-and-expire task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::PeriodicGcConfig;
use crate::health::HealthStore;

/// Spawns the background GC loop. Returns a `JoinHandle` the caller may
/// abort on shutdown; the task itself never blocks request handling.
pub fn spawn_periodic_gc(
    health: Arc<dyn HealthStore>,
    config: PeriodicGcConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_once(health.as_ref(), config.retention).await {
                warn!(error = %err, "periodic health-store gc sweep failed");
            }
        }
    })
}

/// Runs a single GC pass over every model the store currently tracks.
pub async fn sweep_once(health: &dyn HealthStore, retention: Duration) -> Result<(), crate::error::RouterError> {
    let models = health.list_all_models().await?;
    info!(count = models.len(), "running health-store gc sweep");
    for model in models {
        health.gc_latency(&model, retention).await?;
        health.gc_errors(&model, retention).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::InMemoryHealthStore;
    use std::time::SystemTime;

    #[tokio::test]
    async fn sweep_removes_samples_older_than_retention() {
        let store = InMemoryHealthStore::new();
        let old = SystemTime::now() - Duration::from_secs(3600);
        store.record_latency("m", old, 1.0, "200").await.unwrap();
        store
            .record_latency("m", SystemTime::now(), 2.0, "200")
            .await
            .unwrap();

        sweep_once(&store, Duration::from_secs(60)).await.unwrap();

        let tail = store.tail_latencies("m", 10).await.unwrap();
        assert_eq!(tail, vec![2.0]);
    }

    #[tokio::test]
    async fn sweep_covers_every_tracked_model() {
        let store = InMemoryHealthStore::new();
        store
            .record_latency("openai/a", SystemTime::now(), 1.0, "200")
            .await
            .unwrap();
        store
            .record_latency("openai/b", SystemTime::now(), 1.0, "200")
            .await
            .unwrap();
        assert!(sweep_once(&store, Duration::from_secs(60)).await.is_ok());
    }
}
