//! Request Rewriter (C5) — rewrites URL (host/path/query) and
//! authentication headers for the chosen (provider, base, region).

use serde_json::Value;

use crate::auth::{bearer_header, TokenProvider};
use crate::config::{ClientTemplate, RouterConfig};
use crate::error::RouterError;
use crate::model::{ModelId, Provider};

/// A fully rewritten outbound HTTP request, ready for the transport layer.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Rewrites `template` for `model`, injecting the transformed `payload` as
/// the body, following each provider's URL and auth-header rules exactly.
pub async fn rewrite(
    template: &ClientTemplate,
    model: &ModelId,
    config: &RouterConfig,
    token_provider: &dyn TokenProvider,
    payload: &Value,
) -> Result<OutboundRequest, RouterError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| RouterError::Transform(format!("failed to serialize payload: {e}")))?;

    let provider = model.provider.ok_or_else(|| {
        RouterError::ConfigMissing(format!("no provider resolved for model {model}"))
    })?;

    let (url, mut headers) = match provider {
        Provider::OpenAi => {
            let url = format!("https://{}/v1/chat/completions", template.host);
            (url, vec![(template.auth_header_name.clone(), template.auth_header_value.clone())])
        }
        Provider::Azure => {
            let host = model
                .region
                .as_ref()
                .and_then(|r| config.azure_regions.get(r))
                .cloned()
                .unwrap_or_else(|| template.host.clone());
            let version = config.azure_api_version.as_deref().unwrap_or("2023-05-15");
            let url = format!(
                "https://{}/openai/deployments/{}/chat/completions?api-version={}",
                host, model.base, version
            );
            (url, vec![(template.auth_header_name.clone(), template.auth_header_value.clone())])
        }
        Provider::Vertex => {
            let project_id = config.vertex_project_id.as_ref().ok_or_else(|| {
                RouterError::ConfigMissing("vertex_project_id".to_string())
            })?;
            let location = model
                .region
                .clone()
                .or_else(|| config.vertex_location.clone())
                .ok_or_else(|| RouterError::ConfigMissing("vertex_location".to_string()))?;
            let url = format!(
                "https://{location}-aiplatform.googleapis.com/v1beta1/projects/{project_id}/locations/{location}/publishers/google/models/{}:generateContent",
                model.base
            );
            let token = token_provider.token().await?;
            (url, vec![("Authorization".to_string(), bearer_header(&token))])
        }
        Provider::Bedrock => {
            let host = model
                .region
                .as_ref()
                .and_then(|r| config.bedrock_regions.get(r))
                .cloned()
                .unwrap_or_else(|| template.host.clone());
            let url = format!("https://{host}/model/{}/invoke", model.base);
            (url, vec![(template.auth_header_name.clone(), template.auth_header_value.clone())])
        }
    };

    headers.push(("Content-Type".to_string(), "application/json".to_string()));

    Ok(OutboundRequest {
        method: "POST",
        url,
        headers: std::mem::take(&mut headers),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use crate::config::{Candidates, RouterConfig};
    use serde_json::json;

    fn config_with(mutator: impl FnOnce(crate::config::RouterConfigBuilder) -> crate::config::RouterConfigBuilder) -> RouterConfig {
        let builder = RouterConfig::builder()
            .candidates(Candidates::Ordered(vec![ModelId::parse("openai/gpt-4").unwrap()]));
        mutator(builder).build().unwrap()
    }

    #[tokio::test]
    async fn azure_url_law() {
        let config = config_with(|b| {
            b.azure_region("eastus", "eastus.openai.azure.com")
                .azure_api_version("2024-02-01")
        });
        let template = ClientTemplate::new(Provider::Azure, "template.host", "api-key", "secret");
        let model = ModelId::new(Provider::Azure, "gpt-4", Some("eastus".to_string()));
        let provider = StaticTokenProvider::new("unused");
        let req = rewrite(&template, &model, &config, &provider, &json!({})).await.unwrap();
        assert_eq!(
            req.url,
            "https://eastus.openai.azure.com/openai/deployments/gpt-4/chat/completions?api-version=2024-02-01"
        );
        assert!(req.headers.iter().any(|(k, v)| k == "api-key" && v == "secret"));
    }

    #[tokio::test]
    async fn vertex_requires_project_id() {
        let config = config_with(|b| b);
        let template = ClientTemplate::new(Provider::Vertex, "x", "Authorization", "unused");
        let model = ModelId::new(Provider::Vertex, "gemini-pro", Some("us-central1".to_string()));
        let provider = StaticTokenProvider::new("tok");
        let err = rewrite(&template, &model, &config, &provider, &json!({})).await.unwrap_err();
        assert!(matches!(err, RouterError::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn vertex_url_and_bearer_token() {
        let config = config_with(|b| b.vertex_project_id("proj-1"));
        let template = ClientTemplate::new(Provider::Vertex, "x", "Authorization", "unused");
        let model = ModelId::new(Provider::Vertex, "gemini-pro", Some("us-central1".to_string()));
        let provider = StaticTokenProvider::new("tok-123");
        let req = rewrite(&template, &model, &config, &provider, &json!({})).await.unwrap();
        assert_eq!(
            req.url,
            "https://us-central1-aiplatform.googleapis.com/v1beta1/projects/proj-1/locations/us-central1/publishers/google/models/gemini-pro:generateContent"
        );
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer tok-123"));
    }

    #[tokio::test]
    async fn bedrock_host_from_region_map() {
        let config = config_with(|b| b.bedrock_region("us-east-1", "bedrock.us-east-1.amazonaws.com"));
        let template = ClientTemplate::new(Provider::Bedrock, "x", "Authorization", "sigv4");
        let model = ModelId::new(Provider::Bedrock, "anthropic.claude-v2", Some("us-east-1".to_string()));
        let provider = StaticTokenProvider::new("unused");
        let req = rewrite(&template, &model, &config, &provider, &json!({})).await.unwrap();
        assert_eq!(
            req.url,
            "https://bedrock.us-east-1.amazonaws.com/model/anthropic.claude-v2/invoke"
        );
    }

    #[tokio::test]
    async fn openai_keeps_template_host_and_bearer() {
        let config = config_with(|b| b);
        let template = ClientTemplate::new(Provider::OpenAi, "api.openai.com", "Authorization", "Bearer sk-x");
        let model = ModelId::new(Provider::OpenAi, "gpt-4", None);
        let provider = StaticTokenProvider::new("unused");
        let req = rewrite(&template, &model, &config, &provider, &json!({})).await.unwrap();
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer sk-x"));
    }
}
