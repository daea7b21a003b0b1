//! Attempt Engine (C6) — for one selected model: applies the per-model
//! message prefix, enforces per-attempt timeout, performs bounded retries
//! with backoff, records latency/status into the health store, and
//! consults the health evaluator on both success and failure paths.
//!
//! Grounded on `build_http_client_from_config` for client construction and
//! on the `ratatoskr` retry module's loop-and-backoff shape, adapted: the
//! retry budget here is per-observed-status rather than a flat count, so
//! it is resolved lazily each iteration instead of fixed up front.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use reqwest::{header::HeaderMap, header::HeaderName, header::HeaderValue, Client};
use tracing::warn;

use crate::auth::TokenProvider;
use crate::cancel::CancelHandle;
use crate::config::{ClientTemplate, RouterConfig};
use crate::error::RouterError;
use crate::health::evaluator;
use crate::health::HealthStore;
use crate::message::Message;
use crate::model::{ModelId, Provider};
use crate::rewrite::{rewrite, OutboundRequest};
use crate::transform::{apply_message_prefix, to_bedrock_wire, to_openai_wire, to_vertex_wire, GenerationParams};
use serde_json::{Map, Value};

/// The result of a single attempt that produced an HTTP response (as
/// opposed to a network error or cancellation).
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub status: u16,
    pub body: Vec<u8>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared collaborators for running attempts against upstream providers.
pub struct AttemptEngine {
    http: Client,
    health: Arc<dyn HealthStore>,
    token_provider: Arc<dyn TokenProvider>,
}

impl AttemptEngine {
    pub fn new(
        http: Client,
        health: Arc<dyn HealthStore>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            health,
            token_provider,
        }
    }

    /// Attempts a single candidate model: rewrite, send, classify, retry.
    pub async fn try_candidate(
        &self,
        model: &ModelId,
        config: &RouterConfig,
        incoming_messages: &[Message],
        gen_params: &GenerationParams,
        extra: &Map<String, Value>,
        templates: &HashMap<Provider, ClientTemplate>,
        cancel: &CancelHandle,
    ) -> Result<AttemptOutcome, RouterError> {
        let trace_id = uuid::Uuid::new_v4();
        let provider = model
            .provider
            .ok_or_else(|| RouterError::NoClient(format!("no provider resolved for {model}")))?;

        let template = templates
            .get(&provider)
            .ok_or_else(|| RouterError::NoClient(provider.to_string()))?;

        let prefix = config.model_messages.get(&model.raw).cloned().unwrap_or_default();
        let combined_messages = apply_message_prefix(&prefix, incoming_messages)?;

        let wire_body = build_wire_body(provider, model, &combined_messages, gen_params, extra);

        let mut attempts_made: u64 = 0;
        let mut last_status: Option<i64> = None;
        let mut last_response: Option<AttemptOutcome> = None;
        let mut last_error: Option<RouterError> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(RouterError::Cancelled);
            }

            let budget = last_status
                .and_then(|s| config.status_code_retry.resolve(&model.raw, s))
                .unwrap_or_else(|| config.max_retries_for(&model.raw).max(0) as u32);
            let total_allowed = 1 + budget as u64;
            if attempts_made >= total_allowed {
                break;
            }

            let outbound = rewrite(
                template,
                model,
                config,
                self.token_provider.as_ref(),
                &wire_body,
            )
            .await?;

            let start = Instant::now();
            let per_attempt_timeout = config.timeout_for(&model.raw);
            let send_fut = send_request(&self.http, &outbound);
            let outcome = match per_attempt_timeout {
                Some(d) => match tokio::time::timeout(d, send_fut).await {
                    Ok(inner) => inner.map_err(|e| RouterError::Network(e.to_string())),
                    Err(_) => Err(RouterError::Timeout(d)),
                },
                None => send_fut.await.map_err(|e| RouterError::Network(e.to_string())),
            };
            attempts_made += 1;

            match outcome {
                Err(err) => {
                    let elapsed = start.elapsed().as_secs_f64();
                    if let Err(store_err) = self
                        .health
                        .record_latency(&model.raw, SystemTime::now(), elapsed, "error")
                        .await
                    {
                        warn!(model = %model.raw, error = %store_err, "health store record_latency failed");
                    }
                    last_status = None;
                    last_error = Some(err);
                    if cancel.is_cancelled() {
                        return Err(RouterError::Cancelled);
                    }
                    if attempts_made >= total_allowed {
                        break;
                    }
                    warn!(trace_id = %trace_id, model = %model.raw, attempt = attempts_made, "attempt failed, retrying after backoff");
                    tokio::select! {
                        _ = tokio::time::sleep(config.backoff_for(&model.raw)) => {}
                        _ = cancel.cancelled() => return Err(RouterError::Cancelled),
                    }
                }
                Ok(response) => {
                    let elapsed = start.elapsed().as_secs_f64();
                    if let Err(store_err) = self
                        .health
                        .record_latency(&model.raw, SystemTime::now(), elapsed, &response.status.to_string())
                        .await
                    {
                        warn!(model = %model.raw, error = %store_err, "health store record_latency failed");
                    }
                    if response.status >= 400 {
                        if let Err(store_err) = self
                            .health
                            .record_error(&model.raw, SystemTime::now(), response.status as i64)
                            .await
                        {
                            warn!(model = %model.raw, error = %store_err, "health store record_error failed");
                        }
                    }
                    if response.is_success() {
                        let _ = evaluator::latency_health(self.health.as_ref(), config, &model.raw).await;
                        return Ok(response);
                    }
                    let _ = evaluator::error_health(self.health.as_ref(), config, &model.raw).await;
                    last_status = Some(response.status as i64);
                    last_response = Some(response);
                    if attempts_made >= total_allowed {
                        break;
                    }
                }
            }
        }

        if let Some(response) = last_response {
            return Ok(response);
        }
        Err(last_error.unwrap_or_else(|| RouterError::Network(format!("{model}: no attempts issued"))))
    }
}

fn build_wire_body(
    provider: Provider,
    model: &ModelId,
    messages: &[Message],
    gen_params: &GenerationParams,
    extra: &Map<String, Value>,
) -> Value {
    match provider {
        Provider::OpenAi => to_openai_wire(messages, &model.base, gen_params, true),
        Provider::Azure => to_openai_wire(messages, &model.base, gen_params, false),
        Provider::Vertex => to_vertex_wire(messages, &model.raw, gen_params, extra),
        Provider::Bedrock => to_bedrock_wire(messages, &model.base, gen_params),
    }
}

async fn send_request(client: &Client, outbound: &OutboundRequest) -> Result<AttemptOutcome, reqwest::Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in &outbound.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    let response = client
        .post(&outbound.url)
        .headers(headers)
        .body(outbound.body.clone())
        .send()
        .await?;
    let status = response.status().as_u16();
    let body = response.bytes().await?.to_vec();
    Ok(AttemptOutcome { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::config::{Candidates, RouterConfig};
    use crate::health::InMemoryHealthStore;
    use crate::message::Role;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_templates(host: &str) -> HashMap<Provider, ClientTemplate> {
        let mut map = HashMap::new();
        map.insert(
            Provider::OpenAi,
            ClientTemplate::new(Provider::OpenAi, host, "Authorization", "Bearer test"),
        );
        map
    }

    fn config() -> RouterConfig {
        RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![ModelId::parse("openai/gpt-4").unwrap()]))
            .max_retries("openai/gpt-4", 2)
            .backoff_s("openai/gpt-4", 0.0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn succeeds_on_first_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let host = server.uri().trim_start_matches("http://").to_string();
        let engine = AttemptEngine::new(
            Client::new(),
            Arc::new(InMemoryHealthStore::new()),
            Arc::new(StaticTokenProvider::new("x")),
        );
        let model = ModelId::parse("openai/gpt-4").unwrap();
        let messages = vec![Message::new(Role::User, "hi")];
        let gen_params = GenerationParams::default();
        let result = engine
            .try_candidate(
                &model,
                &config(),
                &messages,
                &gen_params,
                &Map::new(),
                &make_templates(&host),
                &CancelHandle::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn retries_until_budget_exhausted_then_returns_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let host = server.uri().trim_start_matches("http://").to_string();
        let engine = AttemptEngine::new(
            Client::new(),
            Arc::new(InMemoryHealthStore::new()),
            Arc::new(StaticTokenProvider::new("x")),
        );
        let model = ModelId::parse("openai/gpt-4").unwrap();
        let messages = vec![Message::new(Role::User, "hi")];
        let gen_params = GenerationParams::default();
        let result = engine
            .try_candidate(
                &model,
                &config(),
                &messages,
                &gen_params,
                &Map::new(),
                &make_templates(&host),
                &CancelHandle::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.status, 503);
    }

    #[tokio::test]
    async fn bad_message_sequence_is_fatal_for_candidate() {
        let engine = AttemptEngine::new(
            Client::new(),
            Arc::new(InMemoryHealthStore::new()),
            Arc::new(StaticTokenProvider::new("x")),
        );
        let model = ModelId::parse("openai/gpt-4").unwrap();
        let messages = vec![Message::new(Role::Assistant, "hi")];
        let gen_params = GenerationParams::default();
        let err = engine
            .try_candidate(
                &model,
                &config(),
                &messages,
                &gen_params,
                &Map::new(),
                &make_templates("unused.invalid"),
                &CancelHandle::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::BadMessageSequence(_)));
    }

    #[tokio::test]
    async fn no_client_when_template_missing() {
        let engine = AttemptEngine::new(
            Client::new(),
            Arc::new(InMemoryHealthStore::new()),
            Arc::new(StaticTokenProvider::new("x")),
        );
        let model = ModelId::parse("azure/gpt-4").unwrap();
        let messages = vec![Message::new(Role::User, "hi")];
        let gen_params = GenerationParams::default();
        let err = engine
            .try_candidate(
                &model,
                &config(),
                &messages,
                &gen_params,
                &Map::new(),
                &make_templates("unused.invalid"),
                &CancelHandle::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NoClient(_)));
    }

    #[tokio::test]
    async fn cancellation_before_first_attempt_returns_cancelled() {
        let engine = AttemptEngine::new(
            Client::new(),
            Arc::new(InMemoryHealthStore::new()),
            Arc::new(StaticTokenProvider::new("x")),
        );
        let model = ModelId::parse("openai/gpt-4").unwrap();
        let messages = vec![Message::new(Role::User, "hi")];
        let gen_params = GenerationParams::default();
        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = engine
            .try_candidate(
                &model,
                &config(),
                &messages,
                &gen_params,
                &Map::new(),
                &make_templates("unused.invalid"),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Cancelled));
    }
}
