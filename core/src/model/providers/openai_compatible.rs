//! OpenAI-compatible Provider
//!
//! Chat Completions clones: DeepSeek, OpenRouter, Groq, Mistral, xAI, Together,
//! Moonshot, Qwen, Ollama, LM Studio and user-supplied endpoints.

use arena_protocol::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::super::error::{ModelError, Result};
use super::super::provider::{ChunkStream, ModelProvider, bearer_headers, parse_response};
use super::super::streaming::{StreamParser, parse_usage};
use super::super::types::{ChatRequest, ChatResponse, Chunk, WireFamily};
use super::{create_client, create_response_stream, endpoint};

/// OpenAI-compatible provider
pub struct OpenAICompatibleProvider {
  client: Client,
  provider_id: String,
  api_key: String,
  base_url: String,
}

impl OpenAICompatibleProvider {
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

  fn build_request(request: &ChatRequest, stream: bool) -> CompletionsRequest {
    CompletionsRequest {
      model: request.model.clone(),
      messages: request
        .messages
        .iter()
        .map(|m| CompletionsMessage {
          role: m.role.to_string(),
          content: m.content.clone(),
        })
        .collect(),
      temperature: request.temperature,
      max_tokens: request.max_tokens,
      top_p: request.top_p,
      frequency_penalty: request.frequency_penalty,
      presence_penalty: request.presence_penalty,
      stream,
      stream_options: stream.then_some(StreamOptions {
        include_usage: true,
      }),
    }
  }

  async fn send(&self, body: &CompletionsRequest) -> Result<reqwest::Response> {
    let mut builder = self
      .client
      .post(endpoint(&self.base_url, "chat/completions"));
    // Local servers run without a key.
    if !self.api_key.is_empty() {
      builder = builder.headers(bearer_headers(&self.api_key));
    }
    Ok(builder.json(body).send().await?)
  }
}

#[derive(Debug, Serialize)]
struct CompletionsRequest {
  model: String,
  messages: Vec<CompletionsMessage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  top_p: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  frequency_penalty: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  presence_penalty: Option<f32>,
  stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct CompletionsMessage {
  role: String,
  content: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
  include_usage: bool,
}

/// Reasoning text under either spelling used by compatible servers.
fn reasoning_field(value: &Value) -> Option<&str> {
  value
    .get("reasoning_content")
    .or_else(|| value.get("reasoning"))
    .and_then(Value::as_str)
    .filter(|s| !s.is_empty())
}

fn convert_response(value: &Value) -> Result<ChatResponse> {
  let message = value
    .pointer("/choices/0/message")
    .ok_or_else(|| ModelError::InvalidResponse("response has no choices".to_string()))?;

  Ok(ChatResponse {
    text: message
      .get("content")
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string(),
    reasoning: reasoning_field(message).map(ToString::to_string),
    usage: value.get("usage").and_then(parse_usage),
  })
}

/// Chat Completions stream parser.
#[derive(Default)]
pub struct CompletionsStreamParser {
  usage: Option<TokenUsage>,
}

impl StreamParser for CompletionsStreamParser {
  fn parse(&mut self, data: &Value) -> Result<Vec<Chunk>> {
    if let Some(error) = data.get("error") {
      let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("stream error");
      return Err(ModelError::StreamError(message.to_string()));
    }

    if let Some(usage) = data.get("usage").and_then(parse_usage) {
      self.usage = Some(usage);
    }

    let mut chunks = Vec::new();
    if let Some(delta) = data.pointer("/choices/0/delta") {
      if let Some(reasoning) = reasoning_field(delta) {
        chunks.push(Chunk::Reasoning(reasoning.to_string()));
      }
      if let Some(text) = delta
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
      {
        chunks.push(Chunk::Text(text.to_string()));
      }
    }
    // finish_reason arrives before the usage-only chunk, so [DONE] ends the stream.
    Ok(chunks)
  }

  fn usage(&self) -> Option<TokenUsage> {
    self.usage
  }
}

#[async_trait]
impl ModelProvider for OpenAICompatibleProvider {
  fn provider_id(&self) -> &str {
    &self.provider_id
  }

  fn family(&self) -> WireFamily {
    WireFamily::OpenAiCompatible
  }

  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
    let body = Self::build_request(&request, false);
    let value: Value = parse_response(self.send(&body).await?).await?;
    convert_response(&value)
  }

  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
    let body = Self::build_request(&request, true);
    let response = self.send(&body).await?;
    Ok(create_response_stream(
      response,
      Box::new(CompletionsStreamParser::default()),
    ))
  }
}
