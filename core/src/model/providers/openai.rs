//! OpenAI Provider
//!
//! Talks to the Responses API, which is the only OpenAI surface that returns
//! reasoning summaries for o-series and GPT-5 models.

use arena_protocol::{MessageRole, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::super::error::{ModelError, Result};
use super::super::provider::{ChunkStream, ModelProvider, bearer_headers, parse_response};
use super::super::streaming::{StreamParser, parse_usage};
use super::super::types::{ChatRequest, ChatResponse, Chunk, ReasoningOptions, WireFamily};
use super::{create_client, create_response_stream, endpoint};

/// OpenAI provider
pub struct OpenAIProvider {
  client: Client,
  provider_id: String,
  api_key: String,
  base_url: String,
}

impl OpenAIProvider {
  /// Create a new OpenAI provider
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

  fn build_request(request: &ChatRequest, stream: bool) -> ResponsesRequest {
    if request.frequency_penalty.is_some() || request.presence_penalty.is_some() {
      tracing::debug!(model = %request.model, "responses API ignores frequency/presence penalties");
    }

    ResponsesRequest {
      model: request.model.clone(),
      instructions: request.system_prompt(),
      input: request
        .conversation()
        .map(|m| InputMessage {
          role: match m.role {
            MessageRole::Assistant => "assistant",
            _ => "user",
          },
          content: m.content.clone(),
        })
        .collect(),
      max_output_tokens: request.max_tokens,
      temperature: request.temperature,
      top_p: request.top_p,
      reasoning: match &request.reasoning {
        Some(ReasoningOptions::ReasoningSummary { summary }) => Some(ReasoningParam {
          summary: summary.clone(),
        }),
        _ => None,
      },
      stream,
      store: false,
    }
  }

  async fn send(&self, body: &ResponsesRequest) -> Result<reqwest::Response> {
    Ok(
      self
        .client
        .post(endpoint(&self.base_url, "responses"))
        .headers(bearer_headers(&self.api_key))
        .json(body)
        .send()
        .await?,
    )
  }
}

// OpenAI-specific types

#[derive(Debug, Serialize)]
struct ResponsesRequest {
  model: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  instructions: Option<String>,
  input: Vec<InputMessage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_output_tokens: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  top_p: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  reasoning: Option<ReasoningParam>,
  stream: bool,
  store: bool,
}

#[derive(Debug, Serialize)]
struct InputMessage {
  role: &'static str,
  content: String,
}

#[derive(Debug, Serialize)]
struct ReasoningParam {
  summary: String,
}

/// Collects text and reasoning summaries from a final response object.
fn convert_response(value: &Value) -> Result<ChatResponse> {
  if let Some(message) = value
    .get("error")
    .filter(|e| !e.is_null())
    .and_then(|e| e.get("message"))
    .and_then(Value::as_str)
  {
    return Err(ModelError::InvalidResponse(message.to_string()));
  }

  let mut text = String::new();
  let mut reasoning = String::new();
  for item in value
    .get("output")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
  {
    match item.get("type").and_then(Value::as_str) {
      Some("message") => {
        for part in item
          .get("content")
          .and_then(Value::as_array)
          .into_iter()
          .flatten()
        {
          if part.get("type").and_then(Value::as_str) == Some("output_text") {
            text.push_str(part.get("text").and_then(Value::as_str).unwrap_or_default());
          }
        }
      }
      Some("reasoning") => {
        for part in item
          .get("summary")
          .and_then(Value::as_array)
          .into_iter()
          .flatten()
        {
          reasoning.push_str(part.get("text").and_then(Value::as_str).unwrap_or_default());
        }
      }
      _ => {}
    }
  }

  Ok(ChatResponse {
    text,
    reasoning: (!reasoning.is_empty()).then_some(reasoning),
    usage: value.get("usage").and_then(parse_usage),
  })
}

/// Responses API stream parser.
#[derive(Default)]
pub struct ResponsesStreamParser {
  usage: Option<TokenUsage>,
}

impl StreamParser for ResponsesStreamParser {
  fn parse(&mut self, data: &Value) -> Result<Vec<Chunk>> {
    let delta = || {
      data
        .get("delta")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
    };

    match data.get("type").and_then(Value::as_str) {
      Some("response.output_text.delta") => Ok(vec![Chunk::Text(delta())]),
      Some("response.reasoning_summary_text.delta") => Ok(vec![Chunk::Reasoning(delta())]),
      Some("response.completed") | Some("response.incomplete") => {
        if let Some(usage) = data
          .get("response")
          .and_then(|r| r.get("usage"))
          .and_then(parse_usage)
        {
          self.usage = Some(usage);
        }
        Ok(vec![Chunk::Done])
      }
      Some("response.failed") => Err(ModelError::StreamError(
        data
          .pointer("/response/error/message")
          .and_then(Value::as_str)
          .unwrap_or("response failed")
          .to_string(),
      )),
      Some("error") => Err(ModelError::StreamError(
        data
          .get("message")
          .and_then(Value::as_str)
          .unwrap_or("stream error")
          .to_string(),
      )),
      _ => Ok(Vec::new()),
    }
  }

  fn usage(&self) -> Option<TokenUsage> {
    self.usage
  }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
  fn provider_id(&self) -> &str {
    &self.provider_id
  }

  fn family(&self) -> WireFamily {
    WireFamily::OpenAi
  }

  fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
    let body = Self::build_request(&request, false);
    let response = self.send(&body).await?;
    let value: Value = parse_response(response).await?;
    convert_response(&value)
  }

  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
    let body = Self::build_request(&request, true);
    let response = self.send(&body).await?;
    Ok(create_response_stream(
      response,
      Box::new(ResponsesStreamParser::default()),
    ))
  }
}
