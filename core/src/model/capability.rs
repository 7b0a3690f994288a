//! Capability Resolver
//!
//! Decides whether a (provider, model) pair is a reasoning model, strips the
//! sampling parameters reasoning models reject, and picks the family-specific
//! switches that expose reasoning traces.

use std::sync::Arc;

use arena_config::ReasoningConfig;
use arena_protocol::GenerationOptions;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::types::{ReasoningOptions, WireFamily};

/// Ability flags of one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
  pub reasoning: bool,
  pub temperature: bool,
  pub vision: bool,
  pub tool_call: bool,
}

/// Source of per-model ability flags for catalog-known models.
pub trait CapabilityCatalog: Send + Sync {
  fn capabilities(&self, provider_id: &str, model_id: &str) -> Option<ModelCapabilities>;
}

/// One entry of the custom-model reasoning allow-list.
#[derive(Debug, Clone)]
pub struct ReasoningRule {
  pub label: &'static str,
  pattern: Regex,
}

impl ReasoningRule {
  /// Case-insensitive rule over the model id.
  pub fn new(label: &'static str, pattern: &str) -> Result<Self, regex::Error> {
    let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
    Ok(Self { label, pattern })
  }

  pub fn matches(&self, model_id: &str) -> bool {
    self.pattern.is_match(model_id)
  }
}

/// Ordered naming conventions of reasoning-capable model lines.
///
/// Ids may carry a router prefix such as `openai/` or `deepseek/`.
const REASONING_RULES: &[(&str, &str)] = &[
  ("openai-o-series", r"(^|/)o[1-9](-|$)"),
  ("gpt-5", r"(^|/)gpt-5"),
  ("deepseek-reasoner", r"deepseek-reasoner"),
  ("r1", r"(^|[/-])r1([-:]|$)"),
  ("claude-thinking", r"claude-(3[-.]7|(sonnet|opus)-4)"),
  ("gemini-thinking", r"gemini-(2\.5|[3-9])"),
  ("qwq", r"(^|/)qwq"),
  ("grok-mini", r"grok-3-mini|grok-4"),
  ("magistral", r"magistral"),
  ("thinking-suffix", r"thinking"),
];

/// Builds the built-in rule table.
pub fn default_rules() -> Vec<ReasoningRule> {
  REASONING_RULES
    .iter()
    .filter_map(|(label, pattern)| match ReasoningRule::new(label, pattern) {
      Ok(rule) => Some(rule),
      Err(err) => {
        tracing::warn!(rule = label, error = %err, "invalid reasoning rule skipped");
        None
      }
    })
    .collect()
}

/// Capabilities decided for one model entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCapabilities {
  pub reasoning: bool,
  pub accepts_temperature: bool,
  pub reasoning_options: Option<ReasoningOptions>,
}

impl ResolvedCapabilities {
  /// Copies the caller's options, dropping what this model rejects.
  ///
  /// Dropped fields are absent, never null.
  pub fn gate_options(&self, options: &GenerationOptions) -> GenerationOptions {
    if self.reasoning {
      return GenerationOptions {
        max_tokens: options.max_tokens,
        ..Default::default()
      };
    }
    let mut gated = options.clone();
    if !self.accepts_temperature {
      gated.temperature = None;
    }
    gated
  }
}

/// Capability Resolver
pub struct CapabilityResolver {
  catalogs: Vec<Arc<dyn CapabilityCatalog>>,
  rules: Vec<ReasoningRule>,
  anthropic_thinking_budget: u32,
  google_thinking_budget: i32,
}

impl CapabilityResolver {
  pub fn new(config: &ReasoningConfig) -> Self {
    Self {
      catalogs: Vec::new(),
      rules: default_rules(),
      anthropic_thinking_budget: config.anthropic_thinking_budget,
      google_thinking_budget: config.google_thinking_budget,
    }
  }

  /// Adds a catalog. Earlier catalogs win.
  pub fn with_catalog(mut self, catalog: Arc<dyn CapabilityCatalog>) -> Self {
    self.catalogs.push(catalog);
    self
  }

  pub fn with_rules(mut self, rules: Vec<ReasoningRule>) -> Self {
    self.rules = rules;
    self
  }

  fn catalog_capabilities(&self, provider_id: &str, model_id: &str) -> Option<ModelCapabilities> {
    self
      .catalogs
      .iter()
      .find_map(|catalog| catalog.capabilities(provider_id, model_id))
  }

  /// First matching rule for a custom model id.
  pub fn matching_rule(&self, model_id: &str) -> Option<&ReasoningRule> {
    self.rules.iter().find(|rule| rule.matches(model_id))
  }

  pub fn is_reasoning_model(&self, provider_id: &str, model_id: &str) -> bool {
    match self.catalog_capabilities(provider_id, model_id) {
      Some(caps) => caps.reasoning,
      None => self.matching_rule(model_id).is_some(),
    }
  }

  /// Extra parameters enabling visible reasoning for a wire family.
  pub fn reasoning_options(&self, family: WireFamily) -> Option<ReasoningOptions> {
    match family {
      WireFamily::Anthropic => Some(ReasoningOptions::Thinking {
        budget_tokens: self.anthropic_thinking_budget,
      }),
      WireFamily::OpenAi => Some(ReasoningOptions::ReasoningSummary {
        summary: "auto".to_string(),
      }),
      WireFamily::Google => Some(ReasoningOptions::IncludeThoughts {
        thinking_budget: self.google_thinking_budget,
      }),
      WireFamily::OpenAiCompatible => None,
    }
  }

  /// Resolves one model entry. `family` is the wire family actually used,
  /// which differs from the logical provider for proxies.
  pub fn resolve(
    &self,
    provider_id: &str,
    family: WireFamily,
    model_id: &str,
  ) -> ResolvedCapabilities {
    let (reasoning, accepts_temperature) = match self.catalog_capabilities(provider_id, model_id) {
      Some(caps) => (caps.reasoning, caps.temperature && !caps.reasoning),
      None => {
        let rule = self.matching_rule(model_id);
        if let Some(rule) = rule {
          tracing::debug!(provider = provider_id, model = model_id, rule = rule.label, "reasoning rule matched");
        }
        (rule.is_some(), rule.is_none())
      }
    };

    ResolvedCapabilities {
      reasoning,
      accepts_temperature,
      reasoning_options: if reasoning {
        self.reasoning_options(family)
      } else {
        None
      },
    }
  }
}

impl Default for CapabilityResolver {
  fn default() -> Self {
    Self::new(&ReasoningConfig::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::registry::EndpointRegistry;
  use pretty_assertions::assert_eq;

  fn resolver() -> CapabilityResolver {
    CapabilityResolver::default().with_catalog(Arc::new(EndpointRegistry::builtin()))
  }

  #[test]
  fn rule_table_detects_reasoning_lines() {
    let resolver = CapabilityResolver::default();
    for id in [
      "o1-preview",
      "o3-mini",
      "openai/o4-mini",
      "gpt-5-nano",
      "deepseek-reasoner",
      "deepseek/deepseek-r1",
      "deepseek-r1:14b",
      "claude-3-7-sonnet-latest",
      "anthropic/claude-sonnet-4",
      "gemini-2.5-flash-lite",
      "QwQ-32B",
      "grok-3-mini-beta",
      "magistral-medium-latest",
      "kimi-k2-thinking",
    ] {
      assert!(resolver.is_reasoning_model("custom", id), "{id} should be reasoning");
    }
  }

  #[test]
  fn rule_table_leaves_chat_models_alone() {
    let resolver = CapabilityResolver::default();
    for id in [
      "gpt-4o",
      "gpt-4.1-mini",
      "claude-3-5-haiku-latest",
      "gemini-2.0-flash",
      "llama-3.3-70b-versatile",
      "mistral-large-latest",
      "yolo-1",
      "ro1",
    ] {
      assert!(!resolver.is_reasoning_model("custom", id), "{id} should not be reasoning");
    }
  }

  #[test]
  fn first_matching_rule_wins() {
    let resolver = CapabilityResolver::default();
    let rule = resolver
      .matching_rule("deepseek-reasoner-thinking")
      .expect("matches");
    assert_eq!(rule.label, "deepseek-reasoner");
  }

  #[test]
  fn catalog_flag_beats_rules() {
    struct Says(bool);
    impl CapabilityCatalog for Says {
      fn capabilities(&self, _: &str, _: &str) -> Option<ModelCapabilities> {
        Some(ModelCapabilities {
          reasoning: self.0,
          temperature: !self.0,
          ..Default::default()
        })
      }
    }

    let resolver = CapabilityResolver::default().with_catalog(Arc::new(Says(false)));
    assert!(!resolver.is_reasoning_model("openai", "o3-mini"));

    let resolver = CapabilityResolver::default().with_catalog(Arc::new(Says(true)));
    assert!(resolver.is_reasoning_model("openai", "gpt-4o"));
  }

  #[test]
  fn reasoning_gate_drops_sampling_fields() {
    let resolved = resolver().resolve("openai", WireFamily::OpenAi, "o3-mini");
    assert!(resolved.reasoning);

    let gated = resolved.gate_options(&GenerationOptions {
      temperature: Some(0.7),
      max_tokens: Some(256),
      top_p: Some(0.9),
      frequency_penalty: Some(0.1),
      presence_penalty: Some(0.2),
    });
    assert_eq!(
      gated,
      GenerationOptions {
        max_tokens: Some(256),
        ..Default::default()
      }
    );
  }

  #[test]
  fn chat_model_keeps_options() {
    let resolved = resolver().resolve("openai", WireFamily::OpenAi, "gpt-4o");
    assert!(!resolved.reasoning);
    assert_eq!(resolved.reasoning_options, None);

    let options = GenerationOptions {
      temperature: Some(0.3),
      top_p: Some(0.5),
      ..Default::default()
    };
    assert_eq!(resolved.gate_options(&options), options);
  }

  #[test]
  fn reasoning_options_follow_wire_family() {
    let resolver = CapabilityResolver::new(&ReasoningConfig {
      anthropic_thinking_budget: 2048,
      google_thinking_budget: 1024,
    });
    assert_eq!(
      resolver.reasoning_options(WireFamily::Anthropic),
      Some(ReasoningOptions::Thinking {
        budget_tokens: 2048
      })
    );
    assert_eq!(
      resolver.reasoning_options(WireFamily::OpenAi),
      Some(ReasoningOptions::ReasoningSummary {
        summary: "auto".to_string()
      })
    );
    assert_eq!(
      resolver.reasoning_options(WireFamily::Google),
      Some(ReasoningOptions::IncludeThoughts {
        thinking_budget: 1024
      })
    );
    assert_eq!(resolver.reasoning_options(WireFamily::OpenAiCompatible), None);
  }

  #[test]
  fn proxy_uses_underlying_family() {
    let resolved = resolver().resolve("custom", WireFamily::Anthropic, "claude-sonnet-4-5");
    assert!(resolved.reasoning);
    assert!(matches!(
      resolved.reasoning_options,
      Some(ReasoningOptions::Thinking { .. })
    ));
  }
}
