//! Minimal `reqwest::Client` construction, grounded on
//! `build_http_client_from_config`'s timeout/proxy/header builder-chain
//! shape. The Attempt Engine applies a per-attempt timeout itself, so the
//! client-level timeout here is left unset by default.

use reqwest::Client;

use crate::error::RouterError;

/// Builds the shared `reqwest::Client` used for every outbound attempt.
/// One client is constructed per `Router` and reused across requests,
/// matching reqwest's own guidance on connection pooling.
pub fn build_http_client() -> Result<Client, RouterError> {
    Client::builder()
        .build()
        .map_err(|e| RouterError::Network(format!("failed to construct http client: {e}")))
}
