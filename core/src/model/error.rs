//! Model layer error types

use thiserror::Error;

/// Model provider errors
#[derive(Error, Debug)]
pub enum ModelError {
  /// Upstream answered with a non-success status
  #[error("HTTP {status}: {message}")]
  ApiError { status: u16, message: String },

  /// Invalid request
  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  /// Invalid response from provider
  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  /// Network error
  #[error("Network error: {0}")]
  NetworkError(#[from] reqwest::Error),

  /// JSON parse error
  #[error("JSON parse error: {0}")]
  JsonError(#[from] serde_json::Error),

  /// Provider id is neither built in nor made custom by a base URL
  #[error("Unsupported provider: {0}")]
  UnsupportedProvider(String),

  /// Streaming error
  #[error("Streaming error: {0}")]
  StreamError(String),

  /// Timeout
  #[error("Request timeout: {0}")]
  Timeout(String),
}

impl ModelError {
  /// Connection-level failure rather than an upstream answer.
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::NetworkError(_))
  }

  /// HTTP-class status code reported alongside a failed result.
  pub fn status_code(&self) -> Option<u16> {
    match self {
      Self::ApiError { status, .. } => Some(*status),
      Self::NetworkError(err) => err.status().map(|s| s.as_u16()).or(Some(502)),
      Self::UnsupportedProvider(_) | Self::InvalidRequest(_) => Some(400),
      Self::Timeout(_) => Some(504),
      Self::InvalidResponse(_) | Self::JsonError(_) | Self::StreamError(_) => Some(502),
    }
  }
}

/// Alias for Result<T, ModelError>
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn api_error_keeps_upstream_status() {
    let err = ModelError::ApiError {
      status: 429,
      message: "slow down".to_string(),
    };
    assert_eq!(err.status_code(), Some(429));
    assert_eq!(err.to_string(), "HTTP 429: slow down");
  }

  #[test]
  fn unsupported_provider_is_a_client_error() {
    assert_eq!(
      ModelError::UnsupportedProvider("acme".to_string()).status_code(),
      Some(400)
    );
  }
}
