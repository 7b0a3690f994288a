// Configuration Types
// All configuration type definitions

use arena_protocol::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Comparison orchestrator settings
  pub orchestrator: OrchestratorConfig,
  /// Credential rotation settings
  pub rotation: RotationConfig,
  /// Reasoning model settings
  pub reasoning: ReasoningConfig,
  /// Per-provider overrides keyed by provider id
  pub providers: HashMap<String, ProviderOverride>,
  /// Logging settings
  pub logging: LoggingConfig,
}

impl Config {
  /// Base URL override configured for a provider, if any.
  pub fn provider_base_url(&self, provider_id: &str) -> Option<&str> {
    self
      .providers
      .get(provider_id)
      .and_then(|p| p.base_url.as_deref())
  }

  /// HTTP timeout for a provider, falling back to the orchestrator default.
  pub fn provider_timeout_secs(&self, provider_id: &str) -> u64 {
    self
      .providers
      .get(provider_id)
      .and_then(|p| p.timeout_secs)
      .unwrap_or(self.orchestrator.request_timeout_secs)
  }
}

// ============================================================================
// ORCHESTRATOR CONFIGURATION
// ============================================================================

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
  /// Capacity of the multiplexed event channel
  pub channel_capacity: usize,
  /// Upper bound on one model execution, in seconds
  pub request_timeout_secs: u64,
  /// Extra attempts against the credential lookup
  pub lookup_retries: u32,
  /// Linear backoff step between lookup attempts, in milliseconds
  pub lookup_backoff_ms: u64,
  /// Mode used when a request does not pick one
  pub default_mode: ExecutionMode,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      channel_capacity: 256,
      request_timeout_secs: 120,
      lookup_retries: 2,
      lookup_backoff_ms: 200,
      default_mode: ExecutionMode::Parallel,
    }
  }
}

// ============================================================================
// ROTATION CONFIGURATION
// ============================================================================

/// Credential selection strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
  #[default]
  RoundRobin,
  Random,
  Weighted,
}

impl std::str::FromStr for RotationStrategy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "round-robin" | "round_robin" => Ok(Self::RoundRobin),
      "random" => Ok(Self::Random),
      "weighted" => Ok(Self::Weighted),
      other => Err(format!("unknown rotation strategy: {other}")),
    }
  }
}

impl std::fmt::Display for RotationStrategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::RoundRobin => write!(f, "round-robin"),
      Self::Random => write!(f, "random"),
      Self::Weighted => write!(f, "weighted"),
    }
  }
}

/// Rotation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
  /// Strategy for pools synced from resolved credentials
  pub strategy: RotationStrategy,
}

// ============================================================================
// REASONING CONFIGURATION
// ============================================================================

/// Reasoning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
  /// Anthropic extended thinking budget, in tokens
  pub anthropic_thinking_budget: u32,
  /// Gemini thinking budget, in tokens (-1 lets the model decide)
  pub google_thinking_budget: i32,
}

impl Default for ReasoningConfig {
  fn default() -> Self {
    Self {
      anthropic_thinking_budget: 12_000,
      google_thinking_budget: -1,
    }
  }
}

// ============================================================================
// PROVIDER OVERRIDES
// ============================================================================

/// Provider override
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
  /// Replaces the registry default base URL
  pub base_url: Option<String>,
  /// HTTP timeout, in seconds
  pub timeout_secs: Option<u64>,
}

// ============================================================================
// LOGGING CONFIGURATION
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// `tracing` env-filter directive used when RUST_LOG is unset
  pub filter: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      filter: "info".to_string(),
    }
  }
}
