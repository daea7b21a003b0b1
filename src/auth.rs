//! Vertex bearer-token capability. Ambient "find default credentials"
//! discovery is replaced with an explicit capability injected into the
//! Request Rewriter; real ADC/service-account resolution is an external
//! collaborator out of scope for this crate.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::RouterError;

/// Supplies short-lived bearer tokens for Vertex requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<SecretString, RouterError>;
}

/// Test/demo stand-in: always returns the same fixed token. No refresh, no
/// ADC resolution — see module docs.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<SecretString, RouterError> {
        Ok(self.token.clone())
    }
}

/// Renders `token` as an `Authorization: Bearer …` header value.
pub fn bearer_header(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
