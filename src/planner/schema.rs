//! Structured model output: locate the JSON object, validate it, and retry
//! exactly once with the schema and the rejected output quoted back.

use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::services::llm::{ChatMessage, GenerateOptions, GenerateRequest, LanguageModel, LlmError};

#[derive(Debug, Error)]
pub enum StructuredError {
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("model output failed validation twice: {reason}")]
    Invalid { reason: String, raw: String },
}

/// Outermost `{...}` span, tolerating prose around it.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

pub fn parse_object(raw: &str) -> Result<Map<String, Value>, String> {
    let span = extract_json_object(raw).ok_or_else(|| "no JSON object found in output".to_string())?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("top-level JSON value is not an object".to_string()),
        Err(e) => Err(format!("malformed JSON: {}", e)),
    }
}

pub fn required_string(map: &Map<String, Value>, field: &str) -> Result<String, String> {
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(format!("field `{}` must be a non-empty string", field)),
        Some(_) => Err(format!("field `{}` must be a string", field)),
        None => Err(format!("missing required field `{}`", field)),
    }
}

pub fn optional_string(map: &Map<String, Value>, field: &str) -> Result<Option<String>, String> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(format!("field `{}` must be a string", field)),
    }
}

pub fn optional_bool(map: &Map<String, Value>, field: &str) -> Result<Option<bool>, String> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(format!("field `{}` must be a boolean", field)),
    }
}

pub fn unit_score(map: &Map<String, Value>, field: &str) -> Result<f32, String> {
    let value = map
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("field `{}` must be a number", field))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("field `{}` must be within [0, 1], got {}", field, value));
    }
    Ok(value as f32)
}

/// Accepts either a list of strings or a single string.
pub fn string_list(map: &Map<String, Value>, field: &str) -> Result<Vec<String>, String> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| format!("field `{}` must contain only strings", field))
            })
            .collect(),
        Some(_) => Err(format!("field `{}` must be a list of strings", field)),
    }
}

pub struct StructuredRequest<'a> {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub options: GenerateOptions,
    pub retry_temperature: f32,
    pub schema_hint: &'a str,
}

/// Calls the model and validates; on the first invalid answer, asks once more
/// at the retry temperature with the schema and the invalid output quoted.
pub async fn request_structured<T, F>(
    llm: &dyn LanguageModel,
    request: StructuredRequest<'_>,
    validate: F,
    cancel: &CancellationToken,
) -> Result<T, StructuredError>
where
    F: Fn(&str) -> Result<T, String>,
{
    let first = GenerateRequest {
        system_prompt: request.system_prompt.clone(),
        messages: request.messages.clone(),
        options: GenerateOptions {
            json_mode: true,
            ..request.options
        },
    };
    let raw = llm.generate(&first, cancel).await?.content;
    let reason = match validate(&raw) {
        Ok(value) => return Ok(value),
        Err(reason) => reason,
    };
    warn!(%reason, "structured output invalid, retrying once");

    let mut messages = request.messages;
    messages.push(ChatMessage::assistant(raw.clone()));
    messages.push(ChatMessage::user(format!(
        "Your previous reply was invalid: {}.\nIt must be exactly one JSON object matching this schema:\n{}\nInvalid output:\n{}\nReply with the corrected JSON object only.",
        reason, request.schema_hint, raw
    )));
    let retry = GenerateRequest {
        system_prompt: request.system_prompt,
        messages,
        options: GenerateOptions {
            temperature: request.retry_temperature,
            json_mode: true,
            ..request.options
        },
    };
    let raw = llm.generate(&retry, cancel).await?.content;
    validate(&raw).map_err(|reason| StructuredError::Invalid { reason, raw })
}
