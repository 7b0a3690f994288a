//! Provider Client Factory
//!
//! Builds a request-capable client for a (provider, credential, optional base
//! URL override) triple.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use arena_config::{Config, ProviderOverride};
use regex::Regex;

use super::error::{ModelError, Result};
use super::provider::ModelProvider;
use super::providers::{AnthropicProvider, GoogleProvider, OpenAICompatibleProvider, OpenAIProvider};
use super::registry::{CUSTOM_PROVIDER_ID, EndpointRegistry};
use super::types::WireFamily;

static VERSION_SEGMENT: LazyLock<Option<Regex>> =
  LazyLock::new(|| Regex::new(r"/v\d+(alpha|beta)?(/|$)").ok());

/// Normalizes a caller-supplied base URL.
///
/// 1. trailing slashes are stripped;
/// 2. a URL ending in `#` is used verbatim, marker included;
/// 3. a URL whose path already has a `/v<digits>[alpha|beta]` segment is kept;
/// 4. anything else gets `/v1` appended.
pub fn normalize_base_url(url: &str) -> String {
  let trimmed = url.trim().trim_end_matches('/');

  if trimmed.ends_with('#') {
    return trimmed.to_string();
  }

  if has_version_segment(trimmed) {
    return trimmed.to_string();
  }

  format!("{trimmed}/v1")
}

fn has_version_segment(url: &str) -> bool {
  let path = url
    .split_once("://")
    .map(|(_, rest)| rest)
    .unwrap_or(url)
    .split_once('/')
    .map(|(_, path)| format!("/{path}"))
    .unwrap_or_default();

  VERSION_SEGMENT
    .as_ref()
    .map(|re| re.is_match(&path))
    .unwrap_or(false)
}

/// Client ready to serve one model entry.
#[derive(Clone)]
pub struct ResolvedProviderClient {
  pub provider_id: String,
  pub family: WireFamily,
  pub base_url: String,
  pub client: Arc<dyn ModelProvider>,
}

impl std::fmt::Debug for ResolvedProviderClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResolvedProviderClient")
      .field("provider_id", &self.provider_id)
      .field("family", &self.family)
      .field("base_url", &self.base_url)
      .finish()
  }
}

/// Seam between the orchestrator and concrete clients.
pub trait ProviderFactory: Send + Sync {
  fn create_client(
    &self,
    provider_id: &str,
    credential: &str,
    override_base_url: Option<&str>,
  ) -> Result<ResolvedProviderClient>;
}

/// Factory backed by the endpoint registry and provider config overrides.
pub struct ProviderClientFactory {
  registry: Arc<EndpointRegistry>,
  overrides: HashMap<String, ProviderOverride>,
  default_timeout_secs: u64,
}

impl ProviderClientFactory {
  pub fn new(registry: Arc<EndpointRegistry>, config: &Config) -> Self {
    Self {
      registry,
      overrides: config.providers.clone(),
      default_timeout_secs: config.orchestrator.request_timeout_secs,
    }
  }

  pub fn registry(&self) -> &EndpointRegistry {
    &self.registry
  }

  fn timeout_secs(&self, provider_id: &str) -> u64 {
    self
      .overrides
      .get(provider_id)
      .and_then(|o| o.timeout_secs)
      .unwrap_or(self.default_timeout_secs)
  }

  /// Family and base URL for a provider id.
  ///
  /// The per-call override wins over the config override, which wins over the
  /// registry default. Overrides are normalized, registry defaults are not.
  fn route(&self, provider_id: &str, override_base_url: Option<&str>) -> Result<(WireFamily, String)> {
    let override_url = override_base_url
      .filter(|url| !url.trim().is_empty())
      .or_else(|| {
        self
          .overrides
          .get(provider_id)
          .and_then(|o| o.base_url.as_deref())
      })
      .map(normalize_base_url);

    match (self.registry.lookup(provider_id), override_url) {
      (Some(endpoint), Some(url)) => Ok((endpoint.family, url)),
      (Some(endpoint), None) if !endpoint.base_url.is_empty() => {
        Ok((endpoint.family, endpoint.base_url.clone()))
      }
      // Unknown id with a URL is a custom OpenAI-compatible endpoint.
      (None, Some(url)) => Ok((WireFamily::OpenAiCompatible, url)),
      (Some(_), None) if provider_id == CUSTOM_PROVIDER_ID => Err(ModelError::InvalidRequest(
        "custom provider requires a base URL".to_string(),
      )),
      _ => Err(ModelError::UnsupportedProvider(provider_id.to_string())),
    }
  }
}

impl ProviderFactory for ProviderClientFactory {
  fn create_client(
    &self,
    provider_id: &str,
    credential: &str,
    override_base_url: Option<&str>,
  ) -> Result<ResolvedProviderClient> {
    let (family, base_url) = self.route(provider_id, override_base_url)?;
    let timeout = Some(self.timeout_secs(provider_id));
    let api_key = credential.to_string();

    let client: Arc<dyn ModelProvider> = match family {
      WireFamily::OpenAi => Arc::new(OpenAIProvider::new(
        provider_id,
        api_key,
        base_url.clone(),
        timeout,
      )),
      WireFamily::Anthropic => Arc::new(AnthropicProvider::new(
        provider_id,
        api_key,
        base_url.clone(),
        timeout,
      )),
      WireFamily::Google => Arc::new(GoogleProvider::new(
        provider_id,
        api_key,
        base_url.clone(),
        timeout,
      )),
      WireFamily::OpenAiCompatible => Arc::new(OpenAICompatibleProvider::new(
        provider_id,
        api_key,
        base_url.clone(),
        timeout,
      )),
    };

    tracing::debug!(provider = provider_id, family = %family, base_url = %base_url, "provider client created");

    Ok(ResolvedProviderClient {
      provider_id: provider_id.to_string(),
      family,
      base_url,
      client,
    })
  }
}
