//! Router configuration — immutable once built.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::message::Message;
use crate::model::{ModelId, Provider};

/// Either an ordered candidate sequence or a weighted distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Candidates {
    Ordered(Vec<ModelId>),
    Weighted(Vec<(ModelId, f64)>),
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        match self {
            Candidates::Ordered(v) => v.is_empty(),
            Candidates::Weighted(v) => v.is_empty(),
        }
    }
}

/// Rolling-average latency health policy for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyPolicy {
    pub threshold_s: f64,
    pub window_n: usize,
    pub recovery: Duration,
}

/// Rolling error-rate policy for one status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPolicy {
    pub threshold_pct: f64,
    pub window_n: usize,
    pub recovery: Duration,
}

/// `status_code_retry` as either a global map or a per-model override.
/// Per-model shadows global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCodeRetry {
    pub global: HashMap<i64, u32>,
    pub per_model: HashMap<String, HashMap<i64, u32>>,
}

impl StatusCodeRetry {
    /// Resolves the retry budget for `model` having observed `status`:
    /// per-model first, else global, else `None` (caller falls back to
    /// `max_retries[M]`).
    pub fn resolve(&self, model: &str, status: i64) -> Option<u32> {
        self.per_model
            .get(model)
            .and_then(|m| m.get(&status))
            .or_else(|| self.global.get(&status))
            .copied()
    }
}

/// A pre-built per-provider template request carrying that provider's auth
/// header, cloned into each outbound attempt. A minimal ambient stand-in —
/// credential acquisition itself is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTemplate {
    pub provider: Provider,
    pub host: String,
    pub auth_header_name: String,
    pub auth_header_value: String,
}

impl ClientTemplate {
    pub fn new(
        provider: Provider,
        host: impl Into<String>,
        auth_header_name: impl Into<String>,
        auth_header_value: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            host: host.into(),
            auth_header_name: auth_header_name.into(),
            auth_header_value: auth_header_value.into(),
        }
    }
}

/// Background GC task parameters, realized here as a typed config rather
/// than the router reading the environment itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicGcConfig {
    pub interval: Duration,
    pub retention: Duration,
}

impl Default for PeriodicGcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 3600),
            retention: Duration::from_secs(24 * 3600),
        }
    }
}

/// Immutable router configuration. Construct via
/// [`RouterConfigBuilder`]; share with `Arc<RouterConfig>` once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub candidates: Candidates,
    pub max_retries: HashMap<String, i64>,
    pub timeout_s: HashMap<String, f64>,
    pub backoff_s: HashMap<String, f64>,
    pub model_messages: HashMap<String, Vec<Message>>,
    pub status_code_retry: StatusCodeRetry,
    pub model_latency: HashMap<String, LatencyPolicy>,
    pub model_error_tracking: HashMap<String, HashMap<i64, ErrorPolicy>>,
    pub azure_regions: HashMap<String, String>,
    pub bedrock_regions: HashMap<String, String>,
    pub vertex_project_id: Option<String>,
    pub vertex_location: Option<String>,
    pub azure_api_version: Option<String>,
    pub client_templates: HashMap<Provider, ClientTemplate>,
    /// Standard Vertex region list used for region expansion when the
    /// incoming model lacks one. Kept as a hardcoded default with an
    /// override hook via the builder.
    pub vertex_default_regions: Vec<String>,
    pub periodic_gc: Option<PeriodicGcConfig>,
}

impl RouterConfig {
    pub const DEFAULT_MAX_RETRIES: i64 = 1;
    pub const DEFAULT_BACKOFF_S: f64 = 0.0;

    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    pub fn max_retries_for(&self, model: &str) -> i64 {
        self.max_retries
            .get(model)
            .copied()
            .unwrap_or(Self::DEFAULT_MAX_RETRIES)
    }

    pub fn timeout_for(&self, model: &str) -> Option<Duration> {
        self.timeout_s.get(model).map(|s| Duration::from_secs_f64(*s))
    }

    pub fn backoff_for(&self, model: &str) -> Duration {
        Duration::from_secs_f64(
            self.backoff_s.get(model).copied().unwrap_or(Self::DEFAULT_BACKOFF_S),
        )
    }

    /// Narrow environment-variable convenience reading exactly three
    /// flags — `ENABLE_PERIODIC_CLEANUP`, `CLEANUP_INTERVAL`,
    /// `DATA_RETENTION` (seconds). General environment/config-file loading
    /// remains out of scope.
    pub fn apply_env_overrides(&mut self) {
        let enabled = std::env::var("ENABLE_PERIODIC_CLEANUP")
            .map(|v| v == "true")
            .unwrap_or(false);
        if !enabled {
            return;
        }
        let mut gc = PeriodicGcConfig::default();
        if let Ok(v) = std::env::var("CLEANUP_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                gc.interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("DATA_RETENTION") {
            if let Ok(secs) = v.parse::<u64>() {
                gc.retention = Duration::from_secs(secs);
            }
        }
        self.periodic_gc = Some(gc);
    }

    /// Validation rules: empty model list, non-positive weights,
    /// weight-sum outside 1.0±1e-6, negative retry counts, status codes
    /// outside [100,599].
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.candidates.is_empty() {
            return Err(RouterError::ConfigInvalid("candidate list is empty".into()));
        }
        if let Candidates::Weighted(weights) = &self.candidates {
            let mut sum = 0.0;
            for (id, w) in weights {
                if *w <= 0.0 {
                    return Err(RouterError::ConfigInvalid(format!(
                        "non-positive weight for {id}: {w}"
                    )));
                }
                sum += w;
            }
            if (sum - 1.0).abs() > 1e-6 {
                return Err(RouterError::ConfigInvalid(format!(
                    "candidate weights sum to {sum}, expected 1.0 ± 1e-6"
                )));
            }
        }
        for (model, n) in &self.max_retries {
            if *n < 0 {
                return Err(RouterError::ConfigInvalid(format!(
                    "negative max_retries for {model}: {n}"
                )));
            }
        }
        let check_codes = |codes: &HashMap<i64, u32>| -> Result<(), RouterError> {
            for code in codes.keys() {
                if !(100..=599).contains(code) {
                    return Err(RouterError::ConfigInvalid(format!(
                        "status code {code} outside [100,599]"
                    )));
                }
            }
            Ok(())
        };
        check_codes(&self.status_code_retry.global)?;
        for codes in self.status_code_retry.per_model.values() {
            check_codes(codes)?;
        }
        for policies in self.model_error_tracking.values() {
            for code in policies.keys() {
                if !(100..=599).contains(code) {
                    return Err(RouterError::ConfigInvalid(format!(
                        "status code {code} outside [100,599]"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builder for `RouterConfig`.
#[derive(Debug, Default)]
pub struct RouterConfigBuilder {
    candidates: Option<Candidates>,
    max_retries: HashMap<String, i64>,
    timeout_s: HashMap<String, f64>,
    backoff_s: HashMap<String, f64>,
    model_messages: HashMap<String, Vec<Message>>,
    status_code_retry: StatusCodeRetry,
    model_latency: HashMap<String, LatencyPolicy>,
    model_error_tracking: HashMap<String, HashMap<i64, ErrorPolicy>>,
    azure_regions: HashMap<String, String>,
    bedrock_regions: HashMap<String, String>,
    vertex_project_id: Option<String>,
    vertex_location: Option<String>,
    azure_api_version: Option<String>,
    client_templates: HashMap<Provider, ClientTemplate>,
    vertex_default_regions: Option<Vec<String>>,
    periodic_gc: Option<PeriodicGcConfig>,
}

impl RouterConfigBuilder {
    pub fn candidates(mut self, candidates: Candidates) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn max_retries(mut self, model: impl Into<String>, n: i64) -> Self {
        self.max_retries.insert(model.into(), n);
        self
    }

    pub fn timeout_s(mut self, model: impl Into<String>, seconds: f64) -> Self {
        self.timeout_s.insert(model.into(), seconds);
        self
    }

    pub fn backoff_s(mut self, model: impl Into<String>, seconds: f64) -> Self {
        self.backoff_s.insert(model.into(), seconds);
        self
    }

    pub fn model_messages(mut self, model: impl Into<String>, messages: Vec<Message>) -> Self {
        self.model_messages.insert(model.into(), messages);
        self
    }

    pub fn status_code_retry(mut self, retry: StatusCodeRetry) -> Self {
        self.status_code_retry = retry;
        self
    }

    pub fn model_latency(mut self, model: impl Into<String>, policy: LatencyPolicy) -> Self {
        self.model_latency.insert(model.into(), policy);
        self
    }

    pub fn model_error_policy(
        mut self,
        model: impl Into<String>,
        status: i64,
        policy: ErrorPolicy,
    ) -> Self {
        self.model_error_tracking
            .entry(model.into())
            .or_default()
            .insert(status, policy);
        self
    }

    pub fn azure_region(mut self, region: impl Into<String>, host: impl Into<String>) -> Self {
        self.azure_regions.insert(region.into(), host.into());
        self
    }

    pub fn bedrock_region(mut self, region: impl Into<String>, host: impl Into<String>) -> Self {
        self.bedrock_regions.insert(region.into(), host.into());
        self
    }

    pub fn vertex_project_id(mut self, id: impl Into<String>) -> Self {
        self.vertex_project_id = Some(id.into());
        self
    }

    pub fn vertex_location(mut self, location: impl Into<String>) -> Self {
        self.vertex_location = Some(location.into());
        self
    }

    pub fn azure_api_version(mut self, version: impl Into<String>) -> Self {
        self.azure_api_version = Some(version.into());
        self
    }

    pub fn client_template(mut self, template: ClientTemplate) -> Self {
        self.client_templates.insert(template.provider, template);
        self
    }

    pub fn vertex_default_regions(mut self, regions: Vec<String>) -> Self {
        self.vertex_default_regions = Some(regions);
        self
    }

    pub fn periodic_gc(mut self, gc: PeriodicGcConfig) -> Self {
        self.periodic_gc = Some(gc);
        self
    }

    pub fn build(self) -> Result<RouterConfig, RouterError> {
        let candidates = self
            .candidates
            .ok_or_else(|| RouterError::ConfigInvalid("no candidates configured".into()))?;
        let config = RouterConfig {
            candidates,
            max_retries: self.max_retries,
            timeout_s: self.timeout_s,
            backoff_s: self.backoff_s,
            model_messages: self.model_messages,
            status_code_retry: self.status_code_retry,
            model_latency: self.model_latency,
            model_error_tracking: self.model_error_tracking,
            azure_regions: self.azure_regions,
            bedrock_regions: self.bedrock_regions,
            vertex_project_id: self.vertex_project_id,
            vertex_location: self.vertex_location,
            azure_api_version: self.azure_api_version,
            client_templates: self.client_templates,
            vertex_default_regions: self.vertex_default_regions.unwrap_or_else(|| {
                vec![
                    "us-central1".to_string(),
                    "us-west1".to_string(),
                    "us-east1".to_string(),
                    "us-west4".to_string(),
                ]
            }),
            periodic_gc: self.periodic_gc,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ModelId {
        ModelId::parse(raw).unwrap()
    }

    #[test]
    fn rejects_empty_candidate_list() {
        let err = RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::ConfigInvalid(_)));
    }

    #[test]
    fn accepts_weights_within_epsilon() {
        let cfg = RouterConfig::builder()
            .candidates(Candidates::Weighted(vec![
                (id("openai/gpt-4"), 0.5000001),
                (id("azure/gpt-4"), 0.4999999),
            ]))
            .build();
        assert!(cfg.is_ok());
    }

    #[test]
    fn rejects_weights_outside_epsilon() {
        let err = RouterConfig::builder()
            .candidates(Candidates::Weighted(vec![
                (id("openai/gpt-4"), 0.5),
                (id("azure/gpt-4"), 0.3),
            ]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::ConfigInvalid(_)));
    }

    #[test]
    fn rejects_non_positive_weight() {
        let err = RouterConfig::builder()
            .candidates(Candidates::Weighted(vec![
                (id("openai/gpt-4"), 0.0),
                (id("azure/gpt-4"), 1.0),
            ]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::ConfigInvalid(_)));
    }

    #[test]
    fn rejects_negative_retries() {
        let err = RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![id("openai/gpt-4")]))
            .max_retries("openai/gpt-4", -1)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::ConfigInvalid(_)));
    }

    #[test]
    fn rejects_status_code_out_of_range() {
        let mut retry = StatusCodeRetry::default();
        retry.global.insert(999, 2);
        let err = RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![id("openai/gpt-4")]))
            .status_code_retry(retry)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::ConfigInvalid(_)));
    }

    #[test]
    fn default_vertex_regions_applied() {
        let cfg = RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![id("openai/gpt-4")]))
            .build()
            .unwrap();
        assert_eq!(cfg.vertex_default_regions.len(), 4);
    }

    #[test]
    fn status_code_retry_resolution_prefers_per_model() {
        let mut retry = StatusCodeRetry::default();
        retry.global.insert(429, 1);
        retry
            .per_model
            .entry("openai/gpt-4".to_string())
            .or_default()
            .insert(429, 5);
        assert_eq!(retry.resolve("openai/gpt-4", 429), Some(5));
        assert_eq!(retry.resolve("azure/gpt-4", 429), Some(1));
        assert_eq!(retry.resolve("azure/gpt-4", 500), None);
    }

    #[test]
    fn max_retries_defaults_to_one() {
        let cfg = RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![id("openai/gpt-4")]))
            .build()
            .unwrap();
        assert_eq!(cfg.max_retries_for("openai/gpt-4"), 1);
    }
}
