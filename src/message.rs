//! Canonical request envelope — the OpenAI-shaped payload every provider's
//! wire format is transformed to/from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::RouterError;

/// A chat message role, a closed enum with a sequencing validator below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role/content pair, with a passthrough bag for fields the canonical
/// shape doesn't know about but a provider roundtrip still needs to carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(flatten, skip_serializing_if = "HashMap::is_empty", default)]
    pub extras: HashMap<String, Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extras: HashMap::new(),
        }
    }
}

/// The OpenAI-shaped canonical request envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten, skip_serializing_if = "HashMap::is_empty", default)]
    pub extra: HashMap<String, Value>,
}

/// Validates legal role sequencing:
/// position 0 must be system or user; after system must be user; after
/// user must be assistant; after assistant must be user.
pub fn validate_message_sequence(messages: &[Message]) -> Result<(), RouterError> {
    let Some(first) = messages.first() else {
        return Ok(());
    };
    if !matches!(first.role, Role::System | Role::User) {
        return Err(RouterError::BadMessageSequence(format!(
            "first message must be system or user, got {}",
            first.role.as_str()
        )));
    }
    for pair in messages.windows(2) {
        let (prev, next) = (pair[0].role, pair[1].role);
        let ok = match prev {
            Role::System => matches!(next, Role::User),
            Role::User => matches!(next, Role::Assistant),
            Role::Assistant => matches!(next, Role::User),
        };
        if !ok {
            return Err(RouterError::BadMessageSequence(format!(
                "illegal transition {} -> {}",
                prev.as_str(),
                next.as_str()
            )));
        }
    }
    Ok(())
}

/// Prepends `prefix` to `messages` and validates the combined sequence.
pub fn prepend_and_validate(
    prefix: &[Message],
    messages: &[Message],
) -> Result<Vec<Message>, RouterError> {
    let mut combined = Vec::with_capacity(prefix.len() + messages.len());
    combined.extend_from_slice(prefix);
    combined.extend_from_slice(messages);
    validate_message_sequence(&combined)?;
    Ok(combined)
}
