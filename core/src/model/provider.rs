//! Model Provider trait
//!
//! This module defines the [ModelProvider] trait every wire client implements,
//! plus the HTTP helpers they share.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::error::{ModelError, Result};
use super::types::{ChatRequest, ChatResponse, Chunk, WireFamily};

/// Boxed stream of normalized chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk>> + Send>>;

/// Model Provider trait
///
/// One implementation per wire family. Instances are bound to a single
/// credential and base URL and are built fresh for every comparison.
#[async_trait]
pub trait ModelProvider: Send + Sync {
  /// Logical provider id this client was built for (e.g. "deepseek")
  fn provider_id(&self) -> &str;

  /// Wire family spoken by this client
  fn family(&self) -> WireFamily;

  /// Base URL requests are sent to
  fn base_url(&self) -> &str;

  /// Creates a chat completion
  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse>;

  /// Creates a streaming chat completion
  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<ChunkStream>;
}

// =============================================================================
// Helper functions for provider implementations
// =============================================================================

/// Turn a non-2xx response into [`ModelError::ApiError`].
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  Err(ModelError::ApiError {
    status: status.as_u16(),
    message: extract_error_message(&body),
  })
}

/// Parse JSON from a response after checking its status
pub async fn parse_response<T: serde::de::DeserializeOwned>(
  response: reqwest::Response,
) -> Result<T> {
  let response = ensure_success(response).await?;
  let body = response.text().await?;
  Ok(serde_json::from_str(&body)?)
}

/// Pulls `error.message` out of a provider error body, falling back to the raw body.
pub fn extract_error_message(body: &str) -> String {
  serde_json::from_str::<serde_json::Value>(body)
    .ok()
    .and_then(|value| {
      let error = value.get("error")?;
      error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| error.as_str())
        .map(ToString::to_string)
    })
    .unwrap_or_else(|| body.trim().to_string())
}

/// Build bearer headers for API requests
pub fn bearer_headers(api_key: &str) -> reqwest::header::HeaderMap {
  use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

  let mut headers = HeaderMap::new();
  if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
    headers.insert(AUTHORIZATION, value);
  }
  headers
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_message_prefers_structured_body() {
    assert_eq!(
      extract_error_message(r#"{"error":{"message":"model not found","type":"invalid_request_error"}}"#),
      "model not found"
    );
    assert_eq!(extract_error_message(r#"{"error":"bad key"}"#), "bad key");
    assert_eq!(extract_error_message("  upstream down \n"), "upstream down");
  }

  #[test]
  fn bearer_header_is_set() {
    let headers = bearer_headers("sk-test");
    assert_eq!(
      headers
        .get(reqwest::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok()),
      Some("Bearer sk-test")
    );
  }
}
