//! Endpoint Registry
//!
//! Static catalog of the providers Arena can talk to: default base URLs,
//! wire family, coarse abilities, and a per-model ability table for the
//! models it knows about.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use super::capability::{CapabilityCatalog, ModelCapabilities};
use super::types::WireFamily;

/// Provider id of the catch-all entry for user-supplied OpenAI-compatible URLs.
pub const CUSTOM_PROVIDER_ID: &str = "custom";

/// One provider endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderEndpoint {
  pub id: String,
  pub name: String,
  pub family: WireFamily,
  /// Empty for the custom entry, which requires an override
  pub base_url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub alternative_base_url: Option<String>,
  pub supports_streaming: bool,
  pub supports_vision: bool,
  pub supports_function_calling: bool,
}

/// Ability flags of one catalog-known model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltinModel {
  pub provider_id: String,
  pub model_id: String,
  pub display_name: String,
  pub reasoning: bool,
  pub temperature: bool,
  pub vision: bool,
  pub tool_call: bool,
}

/// Registry construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
  #[error("duplicate provider id: {0}")]
  DuplicateProvider(String),

  #[error("duplicate model {provider}/{model}")]
  DuplicateModel { provider: String, model: String },

  #[error("model {provider}/{model} references an unknown provider")]
  UnknownProvider { provider: String, model: String },
}

/// Immutable provider catalog.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
  endpoints: Vec<ProviderEndpoint>,
  models: Vec<BuiltinModel>,
}

impl EndpointRegistry {
  /// Builds a registry, rejecting duplicate ids and orphan models.
  pub fn new(
    endpoints: Vec<ProviderEndpoint>,
    models: Vec<BuiltinModel>,
  ) -> Result<Self, RegistryError> {
    let mut ids = HashSet::new();
    for endpoint in &endpoints {
      if !ids.insert(endpoint.id.as_str()) {
        return Err(RegistryError::DuplicateProvider(endpoint.id.clone()));
      }
    }

    let mut pairs = HashSet::new();
    for model in &models {
      if !ids.contains(model.provider_id.as_str()) {
        return Err(RegistryError::UnknownProvider {
          provider: model.provider_id.clone(),
          model: model.model_id.clone(),
        });
      }
      if !pairs.insert((model.provider_id.as_str(), model.model_id.as_str())) {
        return Err(RegistryError::DuplicateModel {
          provider: model.provider_id.clone(),
          model: model.model_id.clone(),
        });
      }
    }

    Ok(Self { endpoints, models })
  }

  /// The built-in catalog.
  pub fn builtin() -> Self {
    Self {
      endpoints: builtin_endpoints(),
      models: builtin_models(),
    }
  }

  pub fn lookup(&self, provider_id: &str) -> Option<&ProviderEndpoint> {
    self.endpoints.iter().find(|e| e.id == provider_id)
  }

  pub fn model(&self, provider_id: &str, model_id: &str) -> Option<&BuiltinModel> {
    self
      .models
      .iter()
      .find(|m| m.provider_id == provider_id && m.model_id == model_id)
  }

  /// Endpoints in catalog order
  pub fn list(&self) -> &[ProviderEndpoint] {
    &self.endpoints
  }

  /// Models of one provider, in catalog order
  pub fn models_for(&self, provider_id: &str) -> impl Iterator<Item = &BuiltinModel> {
    self
      .models
      .iter()
      .filter(move |m| m.provider_id == provider_id)
  }
}

impl Default for EndpointRegistry {
  fn default() -> Self {
    Self::builtin()
  }
}

impl CapabilityCatalog for EndpointRegistry {
  fn capabilities(&self, provider_id: &str, model_id: &str) -> Option<ModelCapabilities> {
    self.model(provider_id, model_id).map(|m| ModelCapabilities {
      reasoning: m.reasoning,
      temperature: m.temperature,
      vision: m.vision,
      tool_call: m.tool_call,
    })
  }
}

// =============================================================================
// Built-in catalog
// =============================================================================

fn endpoint(
  id: &str,
  name: &str,
  family: WireFamily,
  base_url: &str,
  vision: bool,
  function_calling: bool,
) -> ProviderEndpoint {
  ProviderEndpoint {
    id: id.to_string(),
    name: name.to_string(),
    family,
    base_url: base_url.to_string(),
    alternative_base_url: None,
    supports_streaming: true,
    supports_vision: vision,
    supports_function_calling: function_calling,
  }
}

fn builtin_endpoints() -> Vec<ProviderEndpoint> {
  use WireFamily::*;

  let mut moonshot = endpoint(
    "moonshot",
    "Moonshot AI",
    OpenAiCompatible,
    "https://api.moonshot.ai/v1",
    false,
    true,
  );
  moonshot.alternative_base_url = Some("https://api.moonshot.cn/v1".to_string());

  let mut qwen = endpoint(
    "qwen",
    "Alibaba Qwen",
    OpenAiCompatible,
    "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
    true,
    true,
  );
  qwen.alternative_base_url = Some("https://dashscope.aliyuncs.com/compatible-mode/v1".to_string());

  vec![
    endpoint("openai", "OpenAI", OpenAi, "https://api.openai.com/v1", true, true),
    endpoint(
      "anthropic",
      "Anthropic",
      Anthropic,
      "https://api.anthropic.com/v1",
      true,
      true,
    ),
    endpoint(
      "google",
      "Google Gemini",
      Google,
      "https://generativelanguage.googleapis.com/v1beta",
      true,
      true,
    ),
    endpoint(
      "deepseek",
      "DeepSeek",
      OpenAiCompatible,
      "https://api.deepseek.com/v1",
      false,
      true,
    ),
    endpoint(
      "openrouter",
      "OpenRouter",
      OpenAiCompatible,
      "https://openrouter.ai/api/v1",
      true,
      true,
    ),
    endpoint(
      "groq",
      "Groq",
      OpenAiCompatible,
      "https://api.groq.com/openai/v1",
      false,
      true,
    ),
    endpoint(
      "mistral",
      "Mistral AI",
      OpenAiCompatible,
      "https://api.mistral.ai/v1",
      true,
      true,
    ),
    endpoint("xai", "xAI", OpenAiCompatible, "https://api.x.ai/v1", true, true),
    endpoint(
      "together",
      "Together AI",
      OpenAiCompatible,
      "https://api.together.xyz/v1",
      false,
      true,
    ),
    moonshot,
    qwen,
    endpoint(
      "ollama",
      "Ollama",
      OpenAiCompatible,
      "http://localhost:11434/v1",
      false,
      false,
    ),
    endpoint(
      "lmstudio",
      "LM Studio",
      OpenAiCompatible,
      "http://localhost:1234/v1",
      false,
      false,
    ),
    endpoint(
      CUSTOM_PROVIDER_ID,
      "Custom (OpenAI-compatible)",
      OpenAiCompatible,
      "",
      false,
      false,
    ),
  ]
}

fn builtin_models() -> Vec<BuiltinModel> {
  // (provider, model, display name, reasoning, temperature, vision, tool_call)
  const TABLE: &[(&str, &str, &str, bool, bool, bool, bool)] = &[
    ("openai", "gpt-4o", "GPT-4o", false, true, true, true),
    ("openai", "gpt-4o-mini", "GPT-4o mini", false, true, true, true),
    ("openai", "gpt-4.1", "GPT-4.1", false, true, true, true),
    ("openai", "gpt-4.1-mini", "GPT-4.1 mini", false, true, true, true),
    ("openai", "o1", "o1", true, false, true, true),
    ("openai", "o3", "o3", true, false, true, true),
    ("openai", "o3-mini", "o3-mini", true, false, false, true),
    ("openai", "o4-mini", "o4-mini", true, false, true, true),
    ("openai", "gpt-5", "GPT-5", true, false, true, true),
    ("openai", "gpt-5-mini", "GPT-5 mini", true, false, true, true),
    (
      "anthropic",
      "claude-opus-4-20250514",
      "Claude Opus 4",
      true,
      false,
      true,
      true,
    ),
    (
      "anthropic",
      "claude-sonnet-4-20250514",
      "Claude Sonnet 4",
      true,
      false,
      true,
      true,
    ),
    (
      "anthropic",
      "claude-3-7-sonnet-20250219",
      "Claude 3.7 Sonnet",
      true,
      false,
      true,
      true,
    ),
    (
      "anthropic",
      "claude-3-5-haiku-20241022",
      "Claude 3.5 Haiku",
      false,
      true,
      false,
      true,
    ),
    ("google", "gemini-2.5-pro", "Gemini 2.5 Pro", true, false, true, true),
    ("google", "gemini-2.5-flash", "Gemini 2.5 Flash", true, false, true, true),
    ("google", "gemini-2.0-flash", "Gemini 2.0 Flash", false, true, true, true),
    ("deepseek", "deepseek-chat", "DeepSeek V3", false, true, false, true),
    ("deepseek", "deepseek-reasoner", "DeepSeek R1", true, false, false, false),
    ("groq", "llama-3.3-70b-versatile", "Llama 3.3 70B", false, true, false, true),
    ("mistral", "mistral-large-latest", "Mistral Large", false, true, false, true),
    ("xai", "grok-3", "Grok 3", false, true, false, true),
    ("xai", "grok-3-mini", "Grok 3 mini", true, false, false, true),
    ("moonshot", "kimi-k2-0711-preview", "Kimi K2", false, true, false, true),
    ("qwen", "qwen-max", "Qwen Max", false, true, false, true),
    ("qwen", "qwq-plus", "QwQ Plus", true, false, false, false),
  ];

  TABLE
    .iter()
    .map(
      |&(provider, model, name, reasoning, temperature, vision, tool_call)| BuiltinModel {
        provider_id: provider.to_string(),
        model_id: model.to_string(),
        display_name: name.to_string(),
        reasoning,
        temperature,
        vision,
        tool_call,
      },
    )
    .collect()
}

// =============================================================================
// Tests
// =============================================================================
