//! Model provider implementations
//!
//! One wire client per [`WireFamily`](super::types::WireFamily).

use futures::StreamExt;
use reqwest::Client;

use super::error::ModelError;
use super::provider::{ChunkStream, extract_error_message};
use super::streaming::{StreamParser, StreamingConfig, StreamingProcessor};

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod openai_compatible;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAIProvider;
pub use openai_compatible::OpenAICompatibleProvider;

// =============================================================================
// Helper functions for providers
// =============================================================================

/// Create a default HTTP client for providers
pub fn create_client(timeout: Option<u64>) -> Client {
  let timeout = std::time::Duration::from_secs(timeout.unwrap_or(120));

  Client::builder()
    .timeout(timeout)
    .build()
    .unwrap_or_else(|_| Client::new())
}

/// Joins a base URL and an API path. A trailing `#` marker never goes on the wire.
pub fn endpoint(base_url: &str, path: &str) -> String {
  let base = base_url.trim_end_matches('/');
  let base = base.strip_suffix('#').unwrap_or(base).trim_end_matches('/');
  format!("{}/{}", base, path.trim_start_matches('/'))
}

/// Create a unified chunk stream from an SSE response with a family parser.
///
/// Dropping the returned stream drops the response body and aborts the
/// upstream request.
pub fn create_response_stream(
  response: reqwest::Response,
  parser: Box<dyn StreamParser>,
) -> ChunkStream {
  Box::pin(async_stream::stream! {
      let status = response.status();
      let mut stream = response.bytes_stream();
      let mut processor = StreamingProcessor::new(StreamingConfig::sse(parser));

      if !status.is_success() {
          let mut body = String::new();
          while let Some(item) = stream.next().await {
              match item {
                  Ok(bytes) => {
                      body.push_str(&String::from_utf8_lossy(&bytes));
                  }
                  Err(err) => {
                      yield Err(ModelError::NetworkError(err));
                      return;
                  }
              }
          }
          yield Err(ModelError::ApiError {
              status: status.as_u16(),
              message: extract_error_message(&body),
          });
          return;
      }

      while let Some(item) = stream.next().await {
          match item {
              Ok(bytes) => {
                  match processor.push_bytes(&bytes) {
                      Ok(chunks) => {
                          for chunk in chunks {
                              yield Ok(chunk);
                          }
                      }
                      Err(err) => {
                          yield Err(err);
                          return;
                      }
                  }
                  if processor.is_done() {
                      return;
                  }
              }
              Err(err) => {
                  yield Err(ModelError::NetworkError(err));
                  return;
              }
          }
      }

      match processor.finish() {
          Ok(chunks) => {
              for chunk in chunks {
                  yield Ok(chunk);
              }
          }
          Err(err) => yield Err(err),
      }
  })
}
