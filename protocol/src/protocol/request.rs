// Comparison Request Types
// Inbound request shape accepted by the orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of models in one comparison.
pub const MAX_MODELS: usize = 10;

/// Maximum number of conversation messages.
pub const MAX_MESSAGES: usize = 100;

/// Maximum characters per message content.
pub const MAX_CONTENT_CHARS: usize = 50_000;

/// One comparison call: a conversation fanned out to several models.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRequest {
  pub models: Vec<ModelRequestSpec>,
  pub messages: Vec<ChatMessage>,
  #[serde(default)]
  pub options: CompareOptions,
}

/// One model entry of a comparison.
///
/// The credential is an opaque reference; secrets never travel in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequestSpec {
  pub credential_ref: String,
  pub model_id: String,
  #[serde(default, rename = "options")]
  pub generation_options: GenerationOptions,
}

impl ModelRequestSpec {
  pub fn new(credential_ref: impl Into<String>, model_id: impl Into<String>) -> Self {
    Self {
      credential_ref: credential_ref.into(),
      model_id: model_id.into(),
      generation_options: GenerationOptions::default(),
    }
  }

  pub fn with_options(mut self, options: GenerationOptions) -> Self {
    self.generation_options = options;
    self
  }
}

/// Sampling parameters supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub top_p: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub frequency_penalty: Option<f32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub presence_penalty: Option<f32>,
}

/// Conversation message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  System,
  User,
  Assistant,
}

impl std::fmt::Display for MessageRole {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::System => write!(f, "system"),
      Self::User => write!(f, "user"),
      Self::Assistant => write!(f, "assistant"),
    }
  }
}

/// Conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: MessageRole,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::System,
      content: content.into(),
    }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::User,
      content: content.into(),
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::Assistant,
      content: content.into(),
    }
  }
}

/// How units of one call are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
  #[default]
  Parallel,
  Sequential,
}

/// Call-level options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareOptions {
  #[serde(default)]
  pub streaming: bool,
  #[serde(default)]
  pub stop_on_error: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode: Option<ExecutionMode>,
}

/// Request shape violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestValidationError {
  #[error("expected 1 to 10 models, got {0}")]
  ModelCount(usize),

  #[error("expected 1 to 100 messages, got {0}")]
  MessageCount(usize),

  #[error("message {index} content must be 1 to 50000 characters, got {len}")]
  ContentLength { index: usize, len: usize },

  #[error("model entry {0} has an empty model id")]
  EmptyModelId(usize),

  #[error("model entry {0} has an empty credential reference")]
  EmptyCredentialRef(usize),
}

impl ComparisonRequest {
  pub fn new(models: Vec<ModelRequestSpec>, messages: Vec<ChatMessage>) -> Self {
    Self {
      models,
      messages,
      options: CompareOptions::default(),
    }
  }

  /// Checks the shape constraints callers are expected to enforce upstream.
  pub fn validate(&self) -> Result<(), RequestValidationError> {
    if self.models.is_empty() || self.models.len() > MAX_MODELS {
      return Err(RequestValidationError::ModelCount(self.models.len()));
    }
    if self.messages.is_empty() || self.messages.len() > MAX_MESSAGES {
      return Err(RequestValidationError::MessageCount(self.messages.len()));
    }
    for (index, message) in self.messages.iter().enumerate() {
      let len = message.content.chars().count();
      if len == 0 || len > MAX_CONTENT_CHARS {
        return Err(RequestValidationError::ContentLength { index, len });
      }
    }
    for (index, model) in self.models.iter().enumerate() {
      if model.model_id.trim().is_empty() {
        return Err(RequestValidationError::EmptyModelId(index));
      }
      if model.credential_ref.trim().is_empty() {
        return Err(RequestValidationError::EmptyCredentialRef(index));
      }
    }
    Ok(())
  }

  pub fn mode(&self) -> ExecutionMode {
    self.options.mode.unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(models: usize, messages: usize) -> ComparisonRequest {
    ComparisonRequest::new(
      (0..models)
        .map(|i| ModelRequestSpec::new(format!("cred-{i}"), "gpt-4o"))
        .collect(),
      (0..messages).map(|_| ChatMessage::user("hi")).collect(),
    )
  }

  #[test]
  fn validate_accepts_bounds() {
    assert!(request(1, 1).validate().is_ok());
    assert!(request(MAX_MODELS, MAX_MESSAGES).validate().is_ok());
  }

  #[test]
  fn validate_rejects_model_count() {
    assert_eq!(
      request(0, 1).validate(),
      Err(RequestValidationError::ModelCount(0))
    );
    assert_eq!(
      request(MAX_MODELS + 1, 1).validate(),
      Err(RequestValidationError::ModelCount(MAX_MODELS + 1))
    );
  }

  #[test]
  fn validate_rejects_content_length() {
    let mut req = request(1, 2);
    req.messages[1].content = "x".repeat(MAX_CONTENT_CHARS + 1);
    assert_eq!(
      req.validate(),
      Err(RequestValidationError::ContentLength {
        index: 1,
        len: MAX_CONTENT_CHARS + 1
      })
    );

    req.messages[1].content.clear();
    assert!(matches!(
      req.validate(),
      Err(RequestValidationError::ContentLength { index: 1, len: 0 })
    ));
  }

  #[test]
  fn request_parses_camel_case_wire_shape() {
    let json = r#"{
      "models": [
        {"credentialRef": "k1", "modelId": "o3-mini", "options": {"temperature": 0.2, "maxTokens": 64}}
      ],
      "messages": [{"role": "user", "content": "hello"}],
      "options": {"streaming": true, "stopOnError": true, "mode": "sequential"}
    }"#;

    let req: ComparisonRequest = serde_json::from_str(json).expect("parse request");
    assert_eq!(req.models[0].credential_ref, "k1");
    assert_eq!(req.models[0].generation_options.temperature, Some(0.2));
    assert_eq!(req.models[0].generation_options.max_tokens, Some(64));
    assert!(req.options.streaming);
    assert!(req.options.stop_on_error);
    assert_eq!(req.mode(), ExecutionMode::Sequential);
  }

  #[test]
  fn options_default_when_absent() {
    let json = r#"{"models":[{"credentialRef":"k","modelId":"m"}],"messages":[{"role":"user","content":"x"}]}"#;
    let req: ComparisonRequest = serde_json::from_str(json).expect("parse request");
    assert!(!req.options.streaming);
    assert!(!req.options.stop_on_error);
    assert_eq!(req.mode(), ExecutionMode::Parallel);
    assert_eq!(req.models[0].generation_options, GenerationOptions::default());
  }
}
