//! Turns a raw `/chat` body into the payload sent to `/generate`.

use serde_json::{Map, Value};

use crate::error::ProxyError;
use crate::types::{
    ChatMessage, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerateRequest, MAX_PROMPT_CHARS, Role,
};

/// Validate `body` and normalize it. No network traffic happens here, so a
/// rejected request never reaches the inference server.
pub fn normalize(body: &[u8]) -> Result<GenerateRequest, ProxyError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProxyError::Malformed(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ProxyError::Malformed("expected a JSON object".to_owned()));
    };

    let (prompt, messages) = prompt_and_history(&fields)?;

    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ProxyError::EmptyInput);
    }
    let length = prompt.chars().count();
    if length > MAX_PROMPT_CHARS {
        return Err(ProxyError::TooLong(length));
    }

    Ok(GenerateRequest {
        prompt: prompt.to_owned(),
        messages,
        max_tokens: max_tokens(fields.get("max_tokens"))?,
        temperature: temperature(fields.get("temperature"))?,
    })
}

/// `messages` wins over `prompt`; the prompt of a history is its last user turn.
fn prompt_and_history(
    fields: &Map<String, Value>,
) -> Result<(String, Option<Vec<ChatMessage>>), ProxyError> {
    match (fields.get("messages"), fields.get("prompt")) {
        (Some(raw), _) if !raw.is_null() => {
            let messages = parse_messages(raw)?;
            let prompt = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .ok_or_else(|| {
                    ProxyError::MissingField("messages must contain a user message".to_owned())
                })?;
            Ok((prompt, Some(messages)))
        }
        (_, Some(Value::String(prompt))) => Ok((prompt.clone(), None)),
        (_, Some(Value::Null)) | (_, None) => {
            Err(ProxyError::MissingField("prompt or messages".to_owned()))
        }
        (_, Some(_)) => Err(ProxyError::MissingField(
            "prompt must be a string".to_owned(),
        )),
    }
}

fn parse_messages(raw: &Value) -> Result<Vec<ChatMessage>, ProxyError> {
    let Value::Array(items) = raw else {
        return Err(ProxyError::MissingField(
            "messages must be an array".to_owned(),
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<ChatMessage>(item.clone()).map_err(|_| {
                ProxyError::MissingField(format!(
                    "messages[{i}] must be {{role: \"user\"|\"assistant\", content: string}}"
                ))
            })
        })
        .collect()
}

fn max_tokens(raw: Option<&Value>) -> Result<u32, ProxyError> {
    match raw {
        None | Some(Value::Null) => Ok(DEFAULT_MAX_TOKENS),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                ProxyError::OutOfRange("max_tokens must be a positive integer".to_owned())
            }),
    }
}

fn temperature(raw: Option<&Value>) -> Result<f64, ProxyError> {
    let out_of_range =
        || ProxyError::OutOfRange("temperature must be between 0 and 1".to_owned());
    match raw {
        None | Some(Value::Null) => Ok(DEFAULT_TEMPERATURE),
        Some(v) => {
            let t = v.as_f64().ok_or_else(out_of_range)?;
            if (0.0..=1.0).contains(&t) {
                Ok(t)
            } else {
                Err(out_of_range())
            }
        }
    }
}
