//! Fallback Orchestrator (C7) — candidate ordering, priority hoist, region
//! expansion, and sequential health-gated fallback across candidates.
//!
//! Grounded on the `ultrafast-gateway` advanced router's
//! filter-then-select shape: health is checked before a candidate is
//! attempted, never after, so an unhealthy candidate costs zero upstream
//! calls.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::attempt::{AttemptEngine, AttemptOutcome};
use crate::cancel::CancelHandle;
use crate::config::{Candidates, ClientTemplate, RouterConfig};
use crate::error::RouterError;
use crate::health::evaluator::overall_health;
use crate::health::HealthStore;
use crate::message::Message;
use crate::model::{ModelId, Provider};
use crate::transform::GenerationParams;
use serde_json::{Map, Value};

/// Builds the candidate order for one logical request: base list
/// (ordered, or weighted-without-replacement), then priority hoist, then
/// region expansion.
pub fn build_candidate_order(
    config: &RouterConfig,
    requested_model: Option<&str>,
) -> Vec<ModelId> {
    let mut order = match &config.candidates {
        Candidates::Ordered(ids) => ids.clone(),
        Candidates::Weighted(weighted) => weighted_without_replacement(weighted),
    };

    if let Some(requested) = requested_model {
        if let Some(pos) = order.iter().position(|c| c.raw == requested) {
            let hoisted = order.remove(pos);
            order.insert(0, hoisted);
        }
    }

    expand_regions(config, order)
}

/// Draws candidates without replacement, at each step picking among the
/// remaining set with probability proportional to weight.
fn weighted_without_replacement(weighted: &[(ModelId, f64)]) -> Vec<ModelId> {
    let mut remaining: Vec<(ModelId, f64)> = weighted.to_vec();
    let mut order = Vec::with_capacity(weighted.len());
    let mut rng = rand::thread_rng();

    while !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            order.extend(remaining.drain(..).map(|(id, _)| id));
            break;
        }
        let mut pick = rng.gen_range(0.0..total);
        let mut index = remaining.len() - 1;
        for (i, (_, weight)) in remaining.iter().enumerate() {
            if pick < *weight {
                index = i;
                break;
            }
            pick -= weight;
        }
        let (id, _) = remaining.remove(index);
        order.push(id);
    }
    order
}

/// Prepends region-specific variants before entries whose incoming model
/// lacks a region and whose provider supports them, avoiding duplicates.
fn expand_regions(config: &RouterConfig, order: Vec<ModelId>) -> Vec<ModelId> {
    let mut expanded = Vec::with_capacity(order.len());
    for candidate in order {
        let Some(provider) = candidate.provider else {
            expanded.push(candidate);
            continue;
        };
        if candidate.region.is_some() || !provider.supports_regions() {
            expanded.push(candidate);
            continue;
        }
        if provider == Provider::Vertex {
            for region in &config.vertex_default_regions {
                let variant = ModelId::new(provider, candidate.base.clone(), Some(region.clone()));
                if !expanded.iter().any(|c: &ModelId| c.raw == variant.raw) {
                    expanded.push(variant);
                }
            }
        }
        if !expanded.iter().any(|c| c.raw == candidate.raw) {
            expanded.push(candidate);
        }
    }
    expanded
}

/// Runs C7 end to end: builds the order, health-gates and attempts each
/// candidate via C6 until one succeeds or the list is exhausted.
pub async fn run(
    engine: &AttemptEngine,
    health: &Arc<dyn HealthStore>,
    config: &RouterConfig,
    requested_model: Option<&str>,
    messages: &[Message],
    gen_params: &GenerationParams,
    extra: &Map<String, Value>,
    templates: &HashMap<Provider, ClientTemplate>,
    cancel: &CancelHandle,
) -> Result<AttemptOutcome, RouterError> {
    let order = build_candidate_order(config, requested_model);
    let mut last_error: Option<RouterError> = None;

    for candidate in &order {
        if cancel.is_cancelled() {
            return Err(RouterError::Cancelled);
        }

        match overall_health(health.as_ref(), config, &candidate.raw).await {
            Ok(verdict) if !verdict.is_healthy() => {
                info!(model = %candidate.raw, "skipping unhealthy candidate");
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(model = %candidate.raw, error = %err, "health check failed, treating candidate as ineligible");
                last_error = Some(err);
                continue;
            }
        }

        match engine
            .try_candidate(candidate, config, messages, gen_params, extra, templates, cancel)
            .await
        {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) => {
                info!(model = %candidate.raw, status = response.status, "candidate returned non-2xx, falling back");
                last_error = Some(RouterError::UpstreamStatus {
                    status: response.status,
                    body: String::from_utf8_lossy(&response.body).to_string(),
                });
            }
            Err(RouterError::Cancelled) => return Err(RouterError::Cancelled),
            Err(err) => {
                info!(model = %candidate.raw, error = %err, "candidate attempt failed, falling back");
                last_error = Some(err);
            }
        }
    }

    Err(RouterError::AllCandidatesFailed(Box::new(
        last_error.unwrap_or_else(|| RouterError::Network("no candidates configured".into())),
    )))
}
