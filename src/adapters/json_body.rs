//! Strict JSON request bodies.
//!
//! Input types opt into rejecting unknown keys with
//! `#[serde(deny_unknown_fields)]`; this extractor turns serde's failures into
//! client-facing messages and enforces the size limit and single-value rule.
use axum::{
    body::{Bytes, to_bytes},
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::core::error::AppError;

pub const MAX_BODY_BYTES: usize = 1_048_576;

/// A request body decoded from exactly one JSON value.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| {
                AppError::BadRequest(format!("body must not be larger than {MAX_BODY_BYTES} bytes"))
            })?;
        decode(&bytes).map(JsonBody)
    }
}

pub fn decode<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("body must not be empty".to_string()));
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut de).map_err(|e| describe(&e, bytes))?;
    de.end().map_err(|_| {
        AppError::BadRequest("body must only contain a single JSON value".to_string())
    })?;
    Ok(value)
}

fn describe(err: &serde_json::Error, bytes: &[u8]) -> AppError {
    let message = match err.classify() {
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Syntax => format!(
            "body contains badly-formed JSON (at character {})",
            offset_of(err, bytes)
        ),
        Category::Data => {
            let text = err.to_string();
            if let Some(rest) = text.strip_prefix("unknown field ") {
                let key = rest.split(',').next().unwrap_or(rest);
                format!("body contains unknown key {key}")
            } else if text.starts_with("invalid type") {
                format!(
                    "body contains incorrect JSON type (at character {})",
                    offset_of(err, bytes)
                )
            } else {
                format!("body contains invalid JSON: {}", strip_position(&text))
            }
        }
        Category::Io => "body could not be read".to_string(),
    };
    AppError::BadRequest(message)
}

/// Byte offset of an error reported as line/column.
fn offset_of(err: &serde_json::Error, bytes: &[u8]) -> usize {
    let mut line = 1;
    for (idx, byte) in bytes.iter().enumerate() {
        if line == err.line() {
            return idx + err.column();
        }
        if *byte == b'\n' {
            line += 1;
        }
    }
    bytes.len()
}

fn strip_position(text: &str) -> &str {
    text.rsplit_once(" at line ").map_or(text, |(head, _)| head)
}
