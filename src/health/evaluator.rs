//! Health Evaluator (C2) — stateless checks over a `&dyn HealthStore` plus
//! the per-model policy pulled from `RouterConfig`. No state of its own;
//! adapted from consecutive-failure counters to rolling-window averages.

use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::health::HealthStore;

/// Outcome of a single health axis (latency or error) or the combined
/// verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Healthy,
    Unhealthy { reason: String },
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }
}

const WINDOW_CAP: usize = 10;

/// Latency health for `model`.
pub async fn latency_health(
    store: &dyn HealthStore,
    config: &RouterConfig,
    model: &str,
) -> Result<Verdict, RouterError> {
    let Some(policy) = config.model_latency.get(model) else {
        return Ok(Verdict::Healthy);
    };
    if store.in_latency_recovery(model).await? {
        return Ok(Verdict::Unhealthy {
            reason: "still in recovery period".to_string(),
        });
    }
    let window = policy.window_n.min(WINDOW_CAP);
    let samples = store.tail_latencies(model, window).await?;
    if samples.len() < window {
        return Ok(Verdict::Healthy);
    }
    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    if avg > policy.threshold_s {
        store.set_latency_recovery(model, policy.recovery).await?;
        return Ok(Verdict::Unhealthy {
            reason: format!(
                "average latency {avg} exceeds threshold {}",
                policy.threshold_s
            ),
        });
    }
    Ok(Verdict::Healthy)
}

/// Error health for `model`. Checks
/// every status code configured in the model's error policy and returns
/// the first breach found; if none breach, healthy.
pub async fn error_health(
    store: &dyn HealthStore,
    config: &RouterConfig,
    model: &str,
) -> Result<Verdict, RouterError> {
    let Some(policies) = config.model_error_tracking.get(model) else {
        return Ok(Verdict::Healthy);
    };
    if store.in_error_recovery(model).await? {
        return Ok(Verdict::Unhealthy {
            reason: "still in recovery period".to_string(),
        });
    }
    for (status, policy) in policies {
        let window = policy.window_n.min(WINDOW_CAP);
        let samples = store.tail_errors(model, window).await?;
        if samples.is_empty() {
            continue;
        }
        let matching = samples.iter().filter(|s| *s == status).count();
        let pct = 100.0 * matching as f64 / samples.len() as f64;
        if pct >= policy.threshold_pct {
            store.set_error_recovery(model, policy.recovery).await?;
            return Ok(Verdict::Unhealthy {
                reason: format!("status code {status} percentage {pct} exceeds threshold"),
            });
        }
    }
    Ok(Verdict::Healthy)
}

/// Overall verdict combination: if both axes are unhealthy,
/// prefer a concrete breach message over a mere "recovery period" message;
/// if only one is unhealthy, return that one; else healthy.
pub async fn overall_health(
    store: &dyn HealthStore,
    config: &RouterConfig,
    model: &str,
) -> Result<Verdict, RouterError> {
    let latency = latency_health(store, config, model).await?;
    let error = error_health(store, config, model).await?;
    Ok(combine(latency, error))
}

fn combine(latency: Verdict, error: Verdict) -> Verdict {
    let is_concrete = |v: &Verdict| match v {
        Verdict::Unhealthy { reason } => !reason.contains("recovery period"),
        Verdict::Healthy => false,
    };
    match (&latency, &error) {
        (Verdict::Healthy, Verdict::Healthy) => Verdict::Healthy,
        (Verdict::Unhealthy { .. }, Verdict::Healthy) => latency,
        (Verdict::Healthy, Verdict::Unhealthy { .. }) => error,
        (Verdict::Unhealthy { .. }, Verdict::Unhealthy { .. }) => {
            if is_concrete(&latency) {
                latency
            } else if is_concrete(&error) {
                error
            } else {
                latency
            }
        }
    }
}
