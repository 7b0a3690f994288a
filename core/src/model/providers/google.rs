//! Google Gemini Provider
//!
//! Native Gemini REST API integration.

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

/// Google Gemini provider.
pub struct GoogleProvider {
  client: Client,
  provider_id: String,
  api_key: String,
  base_url: String,
}

impl GoogleProvider {
  /// Creates a new Gemini provider.
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

  fn model_endpoint(&self, model: &str, stream: bool) -> String {
    let method = if stream {
      "streamGenerateContent?alt=sse"
    } else {
      "generateContent"
    };
    endpoint(&self.base_url, &format!("models/{model}:{method}"))
  }

  fn build_request(request: &ChatRequest) -> GenerateContentRequest {
    let thinking_config = match &request.reasoning {
      Some(ReasoningOptions::IncludeThoughts { thinking_budget }) => Some(ThinkingConfig {
        include_thoughts: true,
        thinking_budget: *thinking_budget,
      }),
      _ => None,
    };

    GenerateContentRequest {
      contents: request
        .conversation()
        .map(|m| Content {
          role: match m.role {
            MessageRole::Assistant => "model",
            _ => "user",
          },
          parts: vec![Part {
            text: m.content.clone(),
          }],
        })
        .collect(),
      system_instruction: request.system_prompt().map(|text| SystemInstruction {
        parts: vec![Part { text }],
      }),
      generation_config: GenerationConfig {
        temperature: request.temperature,
        max_output_tokens: request.max_tokens,
        top_p: request.top_p,
        frequency_penalty: request.frequency_penalty,
        presence_penalty: request.presence_penalty,
        thinking_config,
      },
    }
  }

  async fn send(&self, model: &str, stream: bool, body: &GenerateContentRequest) -> Result<reqwest::Response> {
    Ok(
      self
        .client
        .post(self.model_endpoint(model, stream))
        .header("x-goog-api-key", &self.api_key)
        .json(body)
        .send()
        .await?,
    )
  }
}

// Gemini-specific types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<SystemInstruction>,
  generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
  role: &'static str,
  parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
  parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
  text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_output_tokens: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  top_p: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  frequency_penalty: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  presence_penalty: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
  include_thoughts: bool,
  thinking_budget: i32,
}

/// Splits the first candidate's parts into (text, thoughts).
fn candidate_parts(value: &Value) -> (String, String) {
  let mut text = String::new();
  let mut thoughts = String::new();
  for part in value
    .pointer("/candidates/0/content/parts")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
  {
    let Some(t) = part.get("text").and_then(Value::as_str) else {
      continue;
    };
    if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
      thoughts.push_str(t);
    } else {
      text.push_str(t);
    }
  }
  (text, thoughts)
}

fn block_reason(value: &Value) -> Option<&str> {
  value
    .pointer("/promptFeedback/blockReason")
    .and_then(Value::as_str)
}

fn convert_response(value: &Value) -> Result<ChatResponse> {
  if let Some(reason) = block_reason(value) {
    return Err(ModelError::InvalidResponse(format!("prompt blocked: {reason}")));
  }
  let (text, thoughts) = candidate_parts(value);
  Ok(ChatResponse {
    text,
    reasoning: (!thoughts.is_empty()).then_some(thoughts),
    usage: value.get("usageMetadata").and_then(parse_usage),
  })
}

/// streamGenerateContent parser. Each event is a partial response object.
#[derive(Default)]
pub struct GeminiStreamParser {
  usage: Option<TokenUsage>,
}

impl StreamParser for GeminiStreamParser {
  fn parse(&mut self, data: &Value) -> Result<Vec<Chunk>> {
    if let Some(message) = data.pointer("/error/message").and_then(Value::as_str) {
      return Err(ModelError::StreamError(message.to_string()));
    }
    if let Some(reason) = block_reason(data) {
      return Err(ModelError::StreamError(format!("prompt blocked: {reason}")));
    }

    if let Some(usage) = data.get("usageMetadata").and_then(parse_usage) {
      self.usage = Some(usage);
    }

    let (text, thoughts) = candidate_parts(data);
    let mut chunks = Vec::new();
    if !thoughts.is_empty() {
      chunks.push(Chunk::Reasoning(thoughts));
    }
    if !text.is_empty() {
      chunks.push(Chunk::Text(text));
    }
    Ok(chunks)
  }

  fn usage(&self) -> Option<TokenUsage> {
    self.usage
  }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
  fn provider_id(&self) -> &str {
    &self.provider_id
  }

  fn family(&self) -> WireFamily {
    WireFamily::Google
  }

  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
    let body = Self::build_request(&request);
    let value: Value = parse_response(self.send(&request.model, false, &body).await?).await?;
    convert_response(&value)
  }

  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
    let body = Self::build_request(&request);
    let response = self.send(&request.model, true, &body).await?;
    Ok(create_response_stream(
      response,
      Box::new(GeminiStreamParser::default()),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use arena_protocol::ChatMessage;
  use pretty_assertions::assert_eq;

  #[test]
  fn endpoint_selects_method() {
    let provider = GoogleProvider::new(
      "google",
      "key".to_string(),
      "https://generativelanguage.googleapis.com/v1beta".to_string(),
      None,
    );
    assert_eq!(
      provider.model_endpoint("gemini-2.5-pro", true),
      "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
    );
    assert_eq!(
      provider.model_endpoint("gemini-2.5-pro", false),
      "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
    );
  }

  #[test]
  fn request_maps_roles_and_thoughts() {
    let mut request = ChatRequest::new(
      "gemini-2.5-flash",
      vec![
        ChatMessage::system("sys"),
        ChatMessage::user("q"),
        ChatMessage::assistant("a"),
      ],
    );
    request.reasoning = Some(ReasoningOptions::IncludeThoughts {
      thinking_budget: -1,
    });

    let body = serde_json::to_value(GoogleProvider::build_request(&request)).expect("json");
    assert_eq!(
      body,
      serde_json::json!({
        "contents": [
          {"role": "user", "parts": [{"text": "q"}]},
          {"role": "model", "parts": [{"text": "a"}]}
        ],
        "systemInstruction": {"parts": [{"text": "sys"}]},
        "generationConfig": {"thinkingConfig": {"includeThoughts": true, "thinkingBudget": -1}}
      })
    );
  }

  #[test]
  fn stream_parser_separates_thoughts() {
    let mut parser = GeminiStreamParser::default();
    let chunks = parser
      .parse(&serde_json::json!({
        "candidates": [{"content": {"parts": [
          {"text": "pondering", "thought": true},
          {"text": "Answer"}
        ]}}],
        "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 14}
      }))
      .expect("parse");
    assert_eq!(
      chunks,
      vec![Chunk::Reasoning("pondering".into()), Chunk::Text("Answer".into())]
    );
    assert_eq!(parser.usage(), Some(TokenUsage::new(4, 6, Some(14))));
  }

  #[test]
  fn blocked_prompt_is_an_error() {
    let err = convert_response(&serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}}))
      .unwrap_err();
    assert!(err.to_string().contains("SAFETY"));
  }
}
