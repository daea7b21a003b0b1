//! `llm-router` — a multi-provider LLM request router and failover
//! transport.
//!
//! Sits between an application and several remote chat-completion APIs
//! (OpenAI, Azure OpenAI, Google Vertex, AWS Bedrock). For each outbound
//! request it selects a candidate model from a configured policy,
//! translates the payload and URL into the selected provider's wire
//! format, enforces per-model timeouts/retries/backoff, tracks rolling
//! latency and error-rate health per model, quarantines unhealthy models,
//! and falls back through the candidate list until one succeeds.
//!
//! Streaming response bodies, load-balancing across multiple router
//! instances, request-body persistence, and authoritative rate-limiting
//! are out of scope — see [`Router`] for the single entry point this
//! crate exposes.

#![deny(unsafe_code)]

pub(crate) mod attempt;
pub mod auth;
pub mod cancel;
pub mod config;
pub mod error;
pub mod gc;
pub mod health;
pub mod http_client;
pub mod message;
pub mod model;
pub(crate) mod orchestrator;
pub(crate) mod rewrite;
pub(crate) mod transform;
pub mod transport;

pub use attempt::AttemptOutcome;
pub use auth::{StaticTokenProvider, TokenProvider};
pub use cancel::CancelHandle;
pub use config::{
    Candidates, ClientTemplate, ErrorPolicy, LatencyPolicy, PeriodicGcConfig, RouterConfig,
    RouterConfigBuilder, StatusCodeRetry,
};
pub use error::RouterError;
pub use health::{HealthStore, InMemoryHealthStore};
pub use message::{CanonicalRequest, Message, Role};
pub use model::{ModelId, Provider};
pub use transport::Router;
