//! Transport Facade (C8) — the outward interface: accepts a canonical
//! request, runs the Fallback Orchestrator, returns the first successful
//! response or the terminal error.
//!
//! Implemented as a plain async method rather than a generic HTTP-client
//! trait, since streaming and multi-instance concerns that would motivate
//! a full middleware-stack integration are out of scope for this crate.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;

use crate::attempt::{AttemptEngine, AttemptOutcome};
use crate::auth::TokenProvider;
use crate::cancel::CancelHandle;
use crate::config::{ClientTemplate, RouterConfig};
use crate::error::RouterError;
use crate::health::HealthStore;
use crate::http_client::build_http_client;
use crate::model::Provider;
use crate::orchestrator;
use crate::transform::{extract_model_and_messages, GenerationParams};

/// The crate's top-level façade. Construct once, share with `Arc`, reuse
/// across requests.
pub struct Router {
    config: RouterConfig,
    engine: AttemptEngine,
    health: Arc<dyn HealthStore>,
    templates: HashMap<Provider, ClientTemplate>,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        health: Arc<dyn HealthStore>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self, RouterError> {
        let http = build_http_client()?;
        let templates = config.client_templates.clone();
        let engine = AttemptEngine::new(http, health.clone(), token_provider);
        Ok(Self {
            config,
            engine,
            health,
            templates,
        })
    }

    /// Builds a `Router` with a caller-supplied `reqwest::Client`, e.g. to
    /// share connection pools with other components of an embedding
    /// application.
    pub fn with_http_client(
        config: RouterConfig,
        http: Client,
        health: Arc<dyn HealthStore>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        let templates = config.client_templates.clone();
        let engine = AttemptEngine::new(http, health.clone(), token_provider);
        Self {
            config,
            engine,
            health,
            templates,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn health_store(&self) -> &Arc<dyn HealthStore> {
        &self.health
    }

    /// Accepts a raw canonical-shaped request body, extracts model and
    /// messages, and runs the fallback orchestrator (C7). The body is
    /// consumed and buffered exactly once here.
    pub async fn send(&self, body: &[u8], cancel: &CancelHandle) -> Result<AttemptOutcome, RouterError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RouterError::Transform(format!("invalid request body: {e}")))?;
        let (model, messages) = extract_model_and_messages(&value)?;

        let gen_params = GenerationParams {
            temperature: value.get("temperature").and_then(Value::as_f64),
            max_tokens: value
                .get("max_tokens")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
            top_p: value.get("top_p").and_then(Value::as_f64),
            top_k: value.get("top_k").and_then(Value::as_u64).map(|n| n as u32),
            stop: value.get("stop").and_then(Value::as_array).map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            }),
        };
        let extra = value
            .get("extra")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let requested = if model.is_empty() { None } else { Some(model.as_str()) };

        orchestrator::run(
            &self.engine,
            &self.health,
            &self.config,
            requested,
            &messages,
            &gen_params,
            &extra,
            &self.templates,
            cancel,
        )
        .await
    }
}
