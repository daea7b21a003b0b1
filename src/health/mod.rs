//! Health Store (C1) — rolling latency/error windows and recovery deadlines
//! per model, behind an async trait so the backing store (here: in-memory,
//! in production: Redis or similar) can be swapped without touching the
//! evaluator, attempt engine, or orchestrator.

pub mod evaluator;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::RouterError;

/// One latency observation.
#[derive(Debug, Clone)]
pub struct LatencySample {
    pub timestamp: SystemTime,
    pub latency_s: f64,
    pub status: String,
}

/// One error observation.
#[derive(Debug, Clone)]
pub struct ErrorSample {
    pub timestamp: SystemTime,
    pub status_code: i64,
}

/// The external key/value contract, expressed as an
/// async trait. `InMemoryHealthStore` below is the crate's canonical
/// implementation; an embedding application may substitute a
/// Redis-backed store without changing C2/C6/C7.
#[async_trait]
pub trait HealthStore: Send + Sync {
    async fn record_latency(
        &self,
        model: &str,
        timestamp: SystemTime,
        latency_s: f64,
        status: &str,
    ) -> Result<(), RouterError>;

    async fn record_error(
        &self,
        model: &str,
        timestamp: SystemTime,
        status_code: i64,
    ) -> Result<(), RouterError>;

    /// Up to `n` most-recent latency values, newest first.
    async fn tail_latencies(&self, model: &str, n: usize) -> Result<Vec<f64>, RouterError>;

    /// Up to `n` most-recent error statuses, newest first, filtered to
    /// samples recorded after the current `error_recovery_deadline` (if one
    /// is set but not yet expired, returns empty).
    async fn tail_errors(&self, model: &str, n: usize) -> Result<Vec<i64>, RouterError>;

    async fn set_latency_recovery(&self, model: &str, deadline: Duration) -> Result<(), RouterError>;

    async fn set_error_recovery(&self, model: &str, deadline: Duration) -> Result<(), RouterError>;

    async fn in_latency_recovery(&self, model: &str) -> Result<bool, RouterError>;

    async fn in_error_recovery(&self, model: &str) -> Result<bool, RouterError>;

    async fn gc_latency(&self, model: &str, age: Duration) -> Result<(), RouterError>;

    async fn gc_errors(&self, model: &str, age: Duration) -> Result<(), RouterError>;

    async fn clear_all(&self, model: &str) -> Result<(), RouterError>;

    async fn list_models_with_prefix(&self, prefix: &str) -> Result<Vec<String>, RouterError>;

    /// All models the store currently holds any record for. Used by the
    /// periodic GC task (C12) to enumerate sweep targets.
    async fn list_all_models(&self) -> Result<Vec<String>, RouterError> {
        self.list_models_with_prefix("").await
    }
}

#[derive(Debug, Default)]
struct ModelRecord {
    latency_series: Vec<LatencySample>,
    error_series: Vec<ErrorSample>,
    latency_recovery_deadline: Option<SystemTime>,
    error_recovery_deadline: Option<SystemTime>,
}

/// In-memory `HealthStore`, grounded on the `RwLock<HashMap<...>>` pattern
/// used for backend health tracking: one lock guarding a map keyed by
/// model identifier, read-mostly access, poisoning tolerated by recovering
/// the inner guard rather than propagating the panic.
#[derive(Debug, Default)]
pub struct InMemoryHealthStore {
    records: RwLock<HashMap<String, ModelRecord>>,
}

impl InMemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> SystemTime {
        SystemTime::now()
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn record_latency(
        &self,
        model: &str,
        timestamp: SystemTime,
        latency_s: f64,
        status: &str,
    ) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = guard.entry(model.to_string()).or_default();
        record.latency_series.push(LatencySample {
            timestamp,
            latency_s,
            status: status.to_string(),
        });
        Ok(())
    }

    async fn record_error(
        &self,
        model: &str,
        timestamp: SystemTime,
        status_code: i64,
    ) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = guard.entry(model.to_string()).or_default();
        record.error_series.push(ErrorSample {
            timestamp,
            status_code,
        });
        Ok(())
    }

    async fn tail_latencies(&self, model: &str, n: usize) -> Result<Vec<f64>, RouterError> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        let Some(record) = guard.get(model) else {
            return Ok(Vec::new());
        };
        Ok(record
            .latency_series
            .iter()
            .rev()
            .take(n)
            .map(|s| s.latency_s)
            .collect())
    }

    async fn tail_errors(&self, model: &str, n: usize) -> Result<Vec<i64>, RouterError> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        let Some(record) = guard.get(model) else {
            return Ok(Vec::new());
        };
        if let Some(deadline) = record.error_recovery_deadline {
            if Self::now() < deadline {
                return Ok(Vec::new());
            }
        }
        let cutoff = record.error_recovery_deadline;
        Ok(record
            .error_series
            .iter()
            .rev()
            .filter(|s| cutoff.map(|d| s.timestamp >= d).unwrap_or(true))
            .take(n)
            .map(|s| s.status_code)
            .collect())
    }

    async fn set_latency_recovery(&self, model: &str, deadline: Duration) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = guard.entry(model.to_string()).or_default();
        record.latency_series.clear();
        record.latency_recovery_deadline = Some(Self::now() + deadline);
        Ok(())
    }

    async fn set_error_recovery(&self, model: &str, deadline: Duration) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = guard.entry(model.to_string()).or_default();
        record.error_series.clear();
        record.error_recovery_deadline = Some(Self::now() + deadline);
        Ok(())
    }

    async fn in_latency_recovery(&self, model: &str) -> Result<bool, RouterError> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .get(model)
            .and_then(|r| r.latency_recovery_deadline)
            .map(|d| Self::now() < d)
            .unwrap_or(false))
    }

    async fn in_error_recovery(&self, model: &str) -> Result<bool, RouterError> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .get(model)
            .and_then(|r| r.error_recovery_deadline)
            .map(|d| Self::now() < d)
            .unwrap_or(false))
    }

    async fn gc_latency(&self, model: &str, age: Duration) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = guard.get_mut(model) {
            let cutoff = Self::now() - age;
            record.latency_series.retain(|s| s.timestamp >= cutoff);
        }
        Ok(())
    }

    async fn gc_errors(&self, model: &str, age: Duration) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = guard.get_mut(model) {
            let cutoff = Self::now() - age;
            record.error_series.retain(|s| s.timestamp >= cutoff);
        }
        Ok(())
    }

    async fn clear_all(&self, model: &str) -> Result<(), RouterError> {
        let mut guard = self.records.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(model);
        Ok(())
    }

    async fn list_models_with_prefix(&self, prefix: &str) -> Result<Vec<String>, RouterError> {
        let guard = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_tail_latencies_newest_first() {
        let store = InMemoryHealthStore::new();
        let t0 = SystemTime::now();
        for i in 0..3u64 {
            store
                .record_latency("m", t0 + Duration::from_secs(i), i as f64, "200")
                .await
                .unwrap();
        }
        let tail = store.tail_latencies("m", 10).await.unwrap();
        assert_eq!(tail, vec![2.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn set_latency_recovery_clears_series() {
        let store = InMemoryHealthStore::new();
        store
            .record_latency("m", SystemTime::now(), 1.0, "200")
            .await
            .unwrap();
        store
            .set_latency_recovery("m", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.tail_latencies("m", 10).await.unwrap().is_empty());
        assert!(store.in_latency_recovery("m").await.unwrap());
    }

    #[tokio::test]
    async fn tail_errors_empty_while_in_recovery() {
        let store = InMemoryHealthStore::new();
        store
            .record_error("m", SystemTime::now(), 500)
            .await
            .unwrap();
        store
            .set_error_recovery("m", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.tail_errors("m", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn gc_removes_old_samples() {
        let store = InMemoryHealthStore::new();
        let old = SystemTime::now() - Duration::from_secs(3600);
        store.record_latency("m", old, 1.0, "200").await.unwrap();
        store
            .record_latency("m", SystemTime::now(), 2.0, "200")
            .await
            .unwrap();
        store.gc_latency("m", Duration::from_secs(60)).await.unwrap();
        let tail = store.tail_latencies("m", 10).await.unwrap();
        assert_eq!(tail, vec![2.0]);
    }

    #[tokio::test]
    async fn list_models_with_prefix() {
        let store = InMemoryHealthStore::new();
        store
            .record_latency("openai/gpt-4", SystemTime::now(), 1.0, "200")
            .await
            .unwrap();
        store
            .record_latency("azure/gpt-4", SystemTime::now(), 1.0, "200")
            .await
            .unwrap();
        let models = store.list_models_with_prefix("openai/").await.unwrap();
        assert_eq!(models, vec!["openai/gpt-4".to_string()]);
    }

    #[tokio::test]
    async fn clear_all_removes_record() {
        let store = InMemoryHealthStore::new();
        store
            .record_latency("m", SystemTime::now(), 1.0, "200")
            .await
            .unwrap();
        store.clear_all("m").await.unwrap();
        assert!(store.tail_latencies("m", 10).await.unwrap().is_empty());
        assert!(!store.in_latency_recovery("m").await.unwrap());
    }
}
