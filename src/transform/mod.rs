//! Payload Transformer (C4) — converts between the canonical OpenAI-shaped
//! request and the Vertex/Bedrock wire shapes.

use serde_json::{json, Map, Value};

use crate::error::RouterError;
use crate::message::{prepend_and_validate, Message, Role};
use crate::model::ModelId;

const VERTEX_RESERVED_KEYS: &[&str] = &["model", "contents", "generationConfig", "stopSequences"];

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;
const DEFAULT_TOP_P: f64 = 0.95;
const DEFAULT_TOP_K: u32 = 40;
const FALLBACK_VERTEX_MODEL: &str = "gemini-pro";

/// The wire shape a raw JSON payload is in, detected by presence of
/// distinguishing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    OpenAi,
    Vertex,
    BedrockAnthropic,
    BedrockTitan,
}

pub fn detect_shape(value: &Value) -> Shape {
    let obj = value.as_object();
    let has = |key: &str| obj.map(|o| o.contains_key(key)).unwrap_or(false);
    if has("contents") {
        return Shape::Vertex;
    }
    if has("prompt") {
        return Shape::BedrockAnthropic;
    }
    if has("inputText") {
        return Shape::BedrockTitan;
    }
    Shape::OpenAi
}

/// Vendor behind a Bedrock model id: `anthropic.*` or a
/// name containing `claude` is Anthropic; `amazon.*` or containing `titan`
/// is Titan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedrockVendor {
    Anthropic,
    Titan,
}

pub fn bedrock_vendor(model_name: &str) -> BedrockVendor {
    let lower = model_name.to_lowercase();
    if lower.starts_with("anthropic.") || lower.contains("claude") {
        BedrockVendor::Anthropic
    } else {
        BedrockVendor::Titan
    }
}

/// Extracts the canonical `(model, messages)` pair from a raw payload of
/// unknown shape, detecting the shape first. Used by the orchestrator for
/// priority hoist and by the transport facade.
pub fn extract_model_and_messages(value: &Value) -> Result<(String, Vec<Message>), RouterError> {
    match detect_shape(value) {
        Shape::OpenAi => {
            let model = value
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let messages = openai_messages_from_value(value)?;
            Ok((model, messages))
        }
        Shape::Vertex => {
            let model = value
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok((model, vertex_contents_to_messages(value)?))
        }
        Shape::BedrockAnthropic => {
            let prompt = value.get("prompt").and_then(Value::as_str).unwrap_or("");
            Ok((String::new(), parse_bedrock_anthropic_prompt(prompt)))
        }
        Shape::BedrockTitan => {
            let text = value.get("inputText").and_then(Value::as_str).unwrap_or("");
            Ok((String::new(), vec![Message::new(Role::User, text)]))
        }
    }
}

fn openai_messages_from_value(value: &Value) -> Result<Vec<Message>, RouterError> {
    let Some(messages) = value.get("messages").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    messages
        .iter()
        .map(|m| {
            let role = match m.get("role").and_then(Value::as_str) {
                Some("system") => Role::System,
                Some("user") => Role::User,
                Some("assistant") => Role::Assistant,
                other => {
                    return Err(RouterError::Transform(format!(
                        "unknown openai role: {other:?}"
                    )))
                }
            };
            let content = m
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Message::new(role, content))
        })
        .collect()
}

/// Maps Vertex `contents[].parts[0].text` back to messages, role mapping
/// `model→assistant`.
fn vertex_contents_to_messages(value: &Value) -> Result<Vec<Message>, RouterError> {
    let Some(contents) = value.get("contents").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    contents
        .iter()
        .map(|c| {
            let role = match c.get("role").and_then(Value::as_str) {
                Some("model") => Role::Assistant,
                Some("user") | None => Role::User,
                Some(other) => {
                    return Err(RouterError::Transform(format!(
                        "unknown vertex role: {other}"
                    )))
                }
            };
            let text = c
                .get("parts")
                .and_then(Value::as_array)
                .and_then(|parts| parts.first())
                .and_then(|p| p.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Message::new(role, text))
        })
        .collect()
}

/// Parses Bedrock Anthropic's `"Human: … Assistant: …"` or
/// `"System: … User: … Assistant: …"` line structure into role/content
/// pairs. A trailing empty `Assistant:` turn is dropped deliberately.
fn parse_bedrock_anthropic_prompt(prompt: &str) -> Vec<Message> {
    fn line_prefix(line: &str) -> Option<(Role, &str)> {
        let trimmed = line.trim_start();
        for (prefix, role) in [
            ("Human:", Role::User),
            ("Assistant:", Role::Assistant),
            ("System:", Role::System),
            ("User:", Role::User),
        ] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                return Some((role, rest.trim()));
            }
        }
        None
    }

    let mut messages = Vec::new();
    let mut current_role: Option<Role> = None;
    let mut buffer: Vec<String> = Vec::new();

    let flush = |role: Option<Role>, buffer: &mut Vec<String>, out: &mut Vec<Message>| {
        if let Some(role) = role {
            let content = buffer.join("\n").trim().to_string();
            if !(role == Role::Assistant && content.is_empty()) {
                out.push(Message::new(role, content));
            }
        }
        buffer.clear();
    };

    for line in prompt.lines() {
        if let Some((role, rest)) = line_prefix(line) {
            flush(current_role.take(), &mut buffer, &mut messages);
            current_role = Some(role);
            if !rest.is_empty() {
                buffer.push(rest.to_string());
            }
        } else if current_role.is_some() && !line.trim().is_empty() {
            buffer.push(line.to_string());
        }
    }
    flush(current_role, &mut buffer, &mut messages);
    messages
}

/// Builds the OpenAI/Azure wire body. Azure omits `model`
/// (the URL carries the deployment).
pub fn to_openai_wire(messages: &[Message], model: &str, gen_params: &GenerationParams, include_model: bool) -> Value {
    let mut body = Map::new();
    if include_model {
        body.insert("model".to_string(), json!(model));
    }
    body.insert("messages".to_string(), messages_to_openai_json(messages));
    insert_generation_params(&mut body, gen_params);
    Value::Object(body)
}

fn messages_to_openai_json(messages: &[Message]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect(),
    )
}

fn insert_generation_params(body: &mut Map<String, Value>, gen_params: &GenerationParams) {
    if let Some(t) = gen_params.temperature {
        body.insert("temperature".to_string(), json!(t));
    }
    if let Some(m) = gen_params.max_tokens {
        body.insert("max_tokens".to_string(), json!(m));
    }
    if let Some(p) = gen_params.top_p {
        body.insert("top_p".to_string(), json!(p));
    }
    if let Some(stop) = &gen_params.stop {
        body.insert("stop".to_string(), json!(stop));
    }
}

/// Generation parameters carried through every transform direction.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub stop: Option<Vec<String>>,
}

/// Builds the Vertex `generateContent` wire body.
/// `model_id` is the full candidate identifier (`vertex/gemini-pro[/region]`);
/// its provider prefix is stripped for the payload's `model` field.
pub fn to_vertex_wire(
    messages: &[Message],
    model_id: &str,
    gen_params: &GenerationParams,
    extra: &serde_json::Map<String, Value>,
) -> Value {
    let base = ModelId::parse(model_id)
        .ok()
        .map(|m| m.base)
        .unwrap_or_default();
    let base = if base.is_empty() {
        FALLBACK_VERTEX_MODEL.to_string()
    } else {
        base
    };

    let contents: Vec<Value> = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                Role::System | Role::User => "user",
            };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    let mut body = Map::new();
    body.insert("model".to_string(), json!(base));
    body.insert("contents".to_string(), Value::Array(contents));
    body.insert(
        "generationConfig".to_string(),
        json!({
            "temperature": gen_params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "maxOutputTokens": gen_params.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            "topP": gen_params.top_p.unwrap_or(DEFAULT_TOP_P),
            "topK": gen_params.top_k.unwrap_or(DEFAULT_TOP_K),
        }),
    );
    if let Some(stop) = &gen_params.stop {
        body.insert("stopSequences".to_string(), json!(stop));
    }
    for (key, value) in extra {
        if !VERTEX_RESERVED_KEYS.contains(&key.as_str()) {
            body.insert(key.clone(), value.clone());
        }
    }
    Value::Object(body)
}

/// Builds the Bedrock wire body for the vendor inferred from `model_name`.
pub fn to_bedrock_wire(messages: &[Message], model_name: &str, gen_params: &GenerationParams) -> Value {
    match bedrock_vendor(model_name) {
        BedrockVendor::Anthropic => to_bedrock_anthropic_wire(messages, gen_params),
        BedrockVendor::Titan => to_bedrock_titan_wire(messages, gen_params),
    }
}

fn to_bedrock_anthropic_wire(messages: &[Message], gen_params: &GenerationParams) -> Value {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("\n\n{label}: {}", message.content));
    }
    prompt.push_str("\n\nAssistant: ");
    json!({
        "prompt": prompt,
        "temperature": gen_params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        "max_tokens": gen_params.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        "top_p": gen_params.top_p.unwrap_or(DEFAULT_TOP_P),
    })
}

fn to_bedrock_titan_wire(messages: &[Message], gen_params: &GenerationParams) -> Value {
    let input_text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    json!({
        "inputText": input_text,
        "textGenerationConfig": {
            "temperature": gen_params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "maxTokenCount": gen_params.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            "topP": gen_params.top_p.unwrap_or(DEFAULT_TOP_P),
        }
    })
}

/// Applies a model-message prefix then validates the combined sequence.
pub fn apply_message_prefix(
    prefix: &[Message],
    messages: &[Message],
) -> Result<Vec<Message>, RouterError> {
    prepend_and_validate(prefix, messages)
}
