use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// Failure payload returned by the admin API.
#[derive(Deserialize, Debug)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(Serialize, Debug)]
pub struct StatusUpdate<'a> {
    pub status: &'a str,
}

/// Pull an error message out of a response body, if it carries one.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error)
        .filter(|m| !m.trim().is_empty())
}

/// Decode a `{ "<key>": [...] }` list envelope.
///
/// A 2xx body that carries `error` instead of the list is an application failure,
/// so an error shape can never be read as an empty success.
pub fn decode_list<T: DeserializeOwned>(key: &str, status: u16, body: &str) -> Result<Vec<T>, FetchError> {
    let mut value: Value = serde_json::from_str(body)?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(FetchError::Application {
            status,
            message: message.to_string(),
        });
    }
    let items = value
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| FetchError::Decode(format!("missing '{}' list in response", key)))?;
    Ok(serde_json::from_value(items)?)
}

/// Decode a single entity, either wrapped as `{ "<key>": {..} }` or bare.
pub fn decode_entity<T: DeserializeOwned>(key: &str, status: u16, body: &str) -> Result<T, FetchError> {
    let mut value: Value = serde_json::from_str(body)?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(FetchError::Application {
            status,
            message: message.to_string(),
        });
    }
    let inner = match value.get_mut(key) {
        Some(v) => v.take(),
        None => value,
    };
    Ok(serde_json::from_value(inner)?)
}
