//! Model Catalog (C3) — parses and validates `provider/base[/region]` identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved provider names. Anything else encountered in a 2-part identifier
/// is treated as `base/region` rather than `provider/base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Azure,
    Vertex,
    Bedrock,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Provider::OpenAi),
            "azure" => Some(Provider::Azure),
            "vertex" => Some(Provider::Vertex),
            "bedrock" => Some(Provider::Bedrock),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Azure => "azure",
            Provider::Vertex => "vertex",
            Provider::Bedrock => "bedrock",
        }
    }

    /// Whether this provider supports per-candidate regions at all.
    pub fn supports_regions(&self) -> bool {
        matches!(self, Provider::Azure | Provider::Vertex | Provider::Bedrock)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed model identifier: `provider/base[/region]`.
///
/// The 2-part form is ambiguous: if the first segment is a reserved
/// provider name it is `provider/base`; otherwise it is `base/region` with
/// the provider left unresolved (recovered later from the URL/template).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId {
    pub provider: Option<Provider>,
    pub base: String,
    pub region: Option<String>,
    /// The identifier exactly as supplied, used as the health-store key and
    /// for exact-match priority-hoist comparisons.
    pub raw: String,
}

impl ModelId {
    /// Build a `ModelId` with an explicit provider (used by tests and by
    /// region-expansion, which always knows the provider already).
    pub fn new(provider: Provider, base: impl Into<String>, region: Option<String>) -> Self {
        let base = base.into();
        let raw = match &region {
            Some(r) => format!("{}/{}/{}", provider, base, r),
            None => format!("{}/{}", provider, base),
        };
        Self {
            provider: Some(provider),
            base,
            region,
            raw,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let parts: Vec<&str> = raw.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("invalid model identifier: {raw:?}"));
        }
        match parts.as_slice() {
            [p0, p1] => {
                if let Some(provider) = Provider::parse(p0) {
                    Ok(Self {
                        provider: Some(provider),
                        base: (*p1).to_string(),
                        region: None,
                        raw: raw.to_string(),
                    })
                } else {
                    // base/region, provider unresolved until URL/template time.
                    Ok(Self {
                        provider: None,
                        base: (*p0).to_string(),
                        region: Some((*p1).to_string()),
                        raw: raw.to_string(),
                    })
                }
            }
            [p0, p1, p2] => {
                let provider = Provider::parse(p0)
                    .ok_or_else(|| format!("unknown provider {p0:?} in {raw:?}"))?;
                Ok(Self {
                    provider: Some(provider),
                    base: (*p1).to_string(),
                    region: Some((*p2).to_string()),
                    raw: raw.to_string(),
                })
            }
            _ => Err(format!("invalid model identifier: {raw:?}")),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_part_known_provider() {
        let m = ModelId::parse("openai/gpt-4").unwrap();
        assert_eq!(m.provider, Some(Provider::OpenAi));
        assert_eq!(m.base, "gpt-4");
        assert_eq!(m.region, None);
    }

    #[test]
    fn two_part_unknown_provider_is_base_region() {
        let m = ModelId::parse("llama3/eu").unwrap();
        assert_eq!(m.provider, None);
        assert_eq!(m.base, "llama3");
        assert_eq!(m.region.as_deref(), Some("eu"));
    }

    #[test]
    fn three_part() {
        let m = ModelId::parse("vertex/gemini-pro/us-central1").unwrap();
        assert_eq!(m.provider, Some(Provider::Vertex));
        assert_eq!(m.base, "gemini-pro");
        assert_eq!(m.region.as_deref(), Some("us-central1"));
    }

    #[test]
    fn rejects_empty_segments_and_too_many_parts() {
        assert!(ModelId::parse("openai//").is_err());
        assert!(ModelId::parse("openai/gpt-4/us/east").is_err());
        assert!(ModelId::parse("bogus/base/region").is_err());
    }

    #[test]
    fn display_roundtrips_raw() {
        let m = ModelId::parse("azure/gpt-4/eastus").unwrap();
        assert_eq!(m.to_string(), "azure/gpt-4/eastus");
    }
}
