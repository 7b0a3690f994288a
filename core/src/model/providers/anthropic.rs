//! Anthropic Provider
//!
//! Messages API with optional extended thinking.

use arena_protocol::{MessageRole, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::super::error::{ModelError, Result};
use super::super::provider::{ChunkStream, ModelProvider, parse_response};
use super::super::streaming::{StreamParser, parse_usage};
use super::super::types::{ChatRequest, ChatResponse, Chunk, ReasoningOptions, WireFamily};
use super::{create_client, create_response_stream, endpoint};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic provider
pub struct AnthropicProvider {
  client: Client,
  provider_id: String,
  api_key: String,
  base_url: String,
}

impl AnthropicProvider {
  /// Create a new Anthropic provider
  pub fn new(
    provider_id: impl Into<String>,
    api_key: String,
    base_url: String,
    timeout: Option<u64>,
  ) -> Self {
    Self {
      client: create_client(timeout),
      provider_id: provider_id.into(),
      api_key,
      base_url,
    }
  }

  fn build_request(request: &ChatRequest, stream: bool) -> MessagesRequest {
    let thinking = match &request.reasoning {
      Some(ReasoningOptions::Thinking { budget_tokens }) => Some(ThinkingParam {
        kind: "enabled",
        budget_tokens: *budget_tokens,
      }),
      _ => None,
    };

    let requested = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    // max_tokens must exceed the thinking budget
    let max_tokens = match &thinking {
      Some(t) => t.budget_tokens.saturating_add(requested),
      None => requested,
    };

    MessagesRequest {
      model: request.model.clone(),
      max_tokens,
      system: request.system_prompt(),
      messages: request
        .conversation()
        .map(|m| AnthropicMessage {
          role: match m.role {
            MessageRole::Assistant => "assistant",
            _ => "user",
          },
          content: m.content.clone(),
        })
        .collect(),
      temperature: request.temperature,
      top_p: request.top_p,
      thinking,
      stream,
    }
  }

  async fn send(&self, body: &MessagesRequest) -> Result<reqwest::Response> {
    Ok(
      self
        .client
        .post(endpoint(&self.base_url, "messages"))
        .header("x-api-key", &self.api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(body)
        .send()
        .await?,
    )
  }
}

// Anthropic-specific types

#[derive(Debug, Serialize)]
struct MessagesRequest {
  model: String,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<String>,
  messages: Vec<AnthropicMessage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  top_p: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  thinking: Option<ThinkingParam>,
  stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
  role: &'static str,
  content: String,
}

#[derive(Debug, Serialize)]
struct ThinkingParam {
  #[serde(rename = "type")]
  kind: &'static str,
  budget_tokens: u32,
}

/// Convert Anthropic response to ChatResponse
fn convert_response(value: &Value) -> ChatResponse {
  let mut text = String::new();
  let mut reasoning = String::new();
  for block in value
    .get("content")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
  {
    match block.get("type").and_then(Value::as_str) {
      Some("text") => text.push_str(block.get("text").and_then(Value::as_str).unwrap_or_default()),
      Some("thinking") => reasoning.push_str(
        block
          .get("thinking")
          .and_then(Value::as_str)
          .unwrap_or_default(),
      ),
      _ => {}
    }
  }

  ChatResponse {
    text,
    reasoning: (!reasoning.is_empty()).then_some(reasoning),
    usage: value.get("usage").and_then(parse_usage),
  }
}

/// Messages stream parser.
///
/// Input tokens arrive on `message_start`, output tokens on `message_delta`.
#[derive(Default)]
pub struct AnthropicStreamParser {
  input_tokens: Option<u32>,
  output_tokens: Option<u32>,
}

impl StreamParser for AnthropicStreamParser {
  fn parse(&mut self, data: &Value) -> Result<Vec<Chunk>> {
    match data.get("type").and_then(Value::as_str) {
      Some("message_start") => {
        if let Some(usage) = data.pointer("/message/usage").and_then(parse_usage) {
          self.input_tokens = Some(usage.input_tokens);
          self.output_tokens = Some(usage.output_tokens);
        }
        Ok(Vec::new())
      }
      Some("content_block_delta") => {
        let delta = data.get("delta").unwrap_or(&Value::Null);
        let chunk = match delta.get("type").and_then(Value::as_str) {
          Some("text_delta") => delta
            .get("text")
            .and_then(Value::as_str)
            .map(|t| Chunk::Text(t.to_string())),
          Some("thinking_delta") => delta
            .get("thinking")
            .and_then(Value::as_str)
            .map(|t| Chunk::Reasoning(t.to_string())),
          _ => None,
        };
        Ok(chunk.into_iter().collect())
      }
      Some("message_delta") => {
        if let Some(output) = data
          .pointer("/usage/output_tokens")
          .and_then(Value::as_u64)
        {
          self.output_tokens = Some(output as u32);
        }
        Ok(Vec::new())
      }
      Some("message_stop") => Ok(vec![Chunk::Done]),
      Some("error") => Err(ModelError::StreamError(
        data
          .pointer("/error/message")
          .and_then(Value::as_str)
          .unwrap_or("stream error")
          .to_string(),
      )),
      _ => Ok(Vec::new()),
    }
  }

  fn usage(&self) -> Option<TokenUsage> {
    if self.input_tokens.is_none() && self.output_tokens.is_none() {
      return None;
    }
    Some(TokenUsage::new(
      self.input_tokens.unwrap_or(0),
      self.output_tokens.unwrap_or(0),
      None,
    ))
  }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
  fn provider_id(&self) -> &str {
    &self.provider_id
  }

  fn family(&self) -> WireFamily {
    WireFamily::Anthropic
  }

  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
    let body = Self::build_request(&request, false);
    let value: Value = parse_response(self.send(&body).await?).await?;
    Ok(convert_response(&value))
  }

  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
    let body = Self::build_request(&request, true);
    let response = self.send(&body).await?;
    Ok(create_response_stream(
      response,
      Box::new(AnthropicStreamParser::default()),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use arena_protocol::ChatMessage;
  use pretty_assertions::assert_eq;

  #[test]
  fn thinking_raises_max_tokens_above_budget() {
    let mut request = ChatRequest::new(
      "claude-sonnet-4-20250514",
      vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
    );
    request.max_tokens = Some(1000);
    request.reasoning = Some(ReasoningOptions::Thinking {
      budget_tokens: 2048,
    });

    let body = serde_json::to_value(AnthropicProvider::build_request(&request, false)).expect("json");
    assert_eq!(
      body,
      serde_json::json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 3048,
        "system": "sys",
        "messages": [{"role": "user", "content": "hi"}],
        "thinking": {"type": "enabled", "budget_tokens": 2048},
        "stream": false
      })
    );
  }

  #[test]
  fn stream_parser_combines_usage_events() {
    let mut parser = AnthropicStreamParser::default();
    parser
      .parse(&serde_json::json!({
        "type": "message_start",
        "message": {"usage": {"input_tokens": 25, "output_tokens": 1}}
      }))
      .expect("parse");
    assert_eq!(
      parser
        .parse(&serde_json::json!({
          "type": "content_block_delta",
          "index": 0,
          "delta": {"type": "thinking_delta", "thinking": "Let me see"}
        }))
        .expect("parse"),
      vec![Chunk::Reasoning("Let me see".into())]
    );
    parser
      .parse(&serde_json::json!({"type": "message_delta", "usage": {"output_tokens": 15}}))
      .expect("parse");
    assert_eq!(
      parser
        .parse(&serde_json::json!({"type": "message_stop"}))
        .expect("parse"),
      vec![Chunk::Done]
    );
    assert_eq!(parser.usage(), Some(TokenUsage::new(25, 15, None)));
  }

  #[test]
  fn convert_response_splits_thinking() {
    let response = convert_response(&serde_json::json!({
      "content": [
        {"type": "thinking", "thinking": "hmm", "signature": "x"},
        {"type": "text", "text": "Hello"}
      ],
      "usage": {"input_tokens": 4, "output_tokens": 6}
    }));
    assert_eq!(response.text, "Hello");
    assert_eq!(response.reasoning.as_deref(), Some("hmm"));
    assert_eq!(response.usage, Some(TokenUsage::new(4, 6, None)));
  }
}
