// Execution Result Types
// Terminal per-model records produced by a comparison

use serde::{Deserialize, Serialize};

/// Terminal status of one model execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
  Success,
  Failed,
  Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Success => write!(f, "success"),
      Self::Failed => write!(f, "failed"),
      Self::Cancelled => write!(f, "cancelled"),
    }
  }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub total_tokens: u32,
}

impl TokenUsage {
  /// Builds usage, deriving the total when the provider omits it.
  pub fn new(input_tokens: u32, output_tokens: u32, total_tokens: Option<u32>) -> Self {
    Self {
      input_tokens,
      output_tokens,
      total_tokens: total_tokens.unwrap_or(input_tokens.saturating_add(output_tokens)),
    }
  }
}

/// Timing metrics of one execution.
///
/// Optional fields are absent rather than zero when they could not be measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
  pub total_time_ms: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time_to_first_token_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tokens_per_second: Option<f64>,
}

/// Terminal record for one requested model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
  pub provider_id: String,
  pub model_id: String,
  pub status: ExecutionStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reasoning: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub usage: Option<TokenUsage>,
  pub metrics: ExecutionMetrics,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status_code: Option<u16>,
}

impl ExecutionResult {
  pub fn is_success(&self) -> bool {
    self.status == ExecutionStatus::Success
  }

  /// A failed record with no output.
  pub fn failed(
    provider_id: impl Into<String>,
    model_id: impl Into<String>,
    message: impl Into<String>,
    status_code: Option<u16>,
    metrics: ExecutionMetrics,
  ) -> Self {
    Self {
      provider_id: provider_id.into(),
      model_id: model_id.into(),
      status: ExecutionStatus::Failed,
      text: None,
      reasoning: None,
      usage: None,
      metrics,
      error_message: Some(message.into()),
      status_code,
    }
  }

  /// A cancelled record. Partial text is kept when some output arrived.
  pub fn cancelled(
    provider_id: impl Into<String>,
    model_id: impl Into<String>,
    partial_text: Option<String>,
    metrics: ExecutionMetrics,
  ) -> Self {
    Self {
      provider_id: provider_id.into(),
      model_id: model_id.into(),
      status: ExecutionStatus::Cancelled,
      text: partial_text,
      reasoning: None,
      usage: None,
      metrics,
      error_message: None,
      status_code: None,
    }
  }
}

/// Aggregated non-streaming response, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResponse {
  pub results: Vec<ExecutionResult>,
}
