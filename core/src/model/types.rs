//! Model layer types
//!
//! Provider-neutral request, response and stream chunk types. Each wire client
//! in [`super::providers`] translates these to and from its own format.

use arena_protocol::{ChatMessage, MessageRole, TokenUsage};
use serde::{Deserialize, Serialize};

/// Wire protocol family spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireFamily {
  /// OpenAI Responses API
  OpenAi,
  /// Anthropic Messages API
  Anthropic,
  /// Gemini generateContent API
  Google,
  /// Chat Completions clones
  OpenAiCompatible,
}

impl WireFamily {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::OpenAi => "openai",
      Self::Anthropic => "anthropic",
      Self::Google => "google",
      Self::OpenAiCompatible => "openai-compatible",
    }
  }
}

impl std::fmt::Display for WireFamily {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.pad(self.as_str())
  }
}

/// Family-specific switches that turn on visible reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningOptions {
  /// Anthropic extended thinking
  Thinking { budget_tokens: u32 },
  /// OpenAI reasoning summaries
  ReasoningSummary { summary: String },
  /// Gemini thought parts
  IncludeThoughts { thinking_budget: i32 },
}

/// Chat completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
  /// Model identifier (e.g., "gpt-4o", "claude-sonnet-4-20250514")
  pub model: String,

  /// Conversation, oldest first
  pub messages: Vec<ChatMessage>,

  /// Sampling temperature
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,

  /// Maximum tokens to generate
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,

  /// Top p (nucleus sampling)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub top_p: Option<f32>,

  /// Frequency penalty
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub frequency_penalty: Option<f32>,

  /// Presence penalty
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub presence_penalty: Option<f32>,

  /// Reasoning switches for reasoning models
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reasoning: Option<ReasoningOptions>,
}

impl ChatRequest {
  pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
    Self {
      model: model.into(),
      messages,
      ..Default::default()
    }
  }

  /// System prompt assembled from every system message, if any.
  pub fn system_prompt(&self) -> Option<String> {
    let parts: Vec<&str> = self
      .messages
      .iter()
      .filter(|m| m.role == MessageRole::System)
      .map(|m| m.content.as_str())
      .collect();
    if parts.is_empty() {
      None
    } else {
      Some(parts.join("\n\n"))
    }
  }

  /// Messages excluding system ones, for APIs with a separate system field.
  pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
    self
      .messages
      .iter()
      .filter(|m| m.role != MessageRole::System)
  }
}

/// Non-streaming completion result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
  pub text: String,
  pub reasoning: Option<String>,
  pub usage: Option<TokenUsage>,
}

/// Normalized streaming chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
  /// Output text delta
  Text(String),
  /// Reasoning trace delta
  Reasoning(String),
  /// Final token accounting
  Usage(TokenUsage),
  /// End of the model's output
  Done,
}
