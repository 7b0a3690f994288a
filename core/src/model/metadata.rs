//! Model metadata manager.
//!
//! Pulls model ability flags from models.dev and keeps a local JSON cache, so
//! models missing from the built-in table still get catalog-accurate flags.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use super::capability::{CapabilityCatalog, ModelCapabilities};
use super::error::{ModelError, Result};

/// Public models.dev catalog.
pub const MODELS_DEV_URL: &str = "https://models.dev/api.json";

/// Token/context limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelLimit {
  #[serde(default)]
  pub context: usize,
  #[serde(default)]
  pub output: usize,
}

/// Unified metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
  pub id: String,
  pub name: String,
  pub capabilities: ModelCapabilities,
  #[serde(default)]
  pub limit: ModelLimit,
}

/// Raw models.dev provider section.
#[derive(Debug, Clone, Deserialize)]
struct ProviderData {
  #[serde(default)]
  models: HashMap<String, ModelsDevModel>,
}

/// Raw models.dev model entry.
#[derive(Debug, Clone, Deserialize)]
struct ModelsDevModel {
  #[serde(default)]
  name: String,
  #[serde(default)]
  attachment: bool,
  #[serde(default)]
  reasoning: bool,
  #[serde(default)]
  temperature: bool,
  #[serde(default)]
  tool_call: bool,
  #[serde(default)]
  limit: ModelLimit,
  #[serde(default)]
  modalities: Option<Modalities>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Modalities {
  #[serde(default)]
  input: Vec<String>,
}

/// Local metadata cache format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetadataCache {
  models: HashMap<String, ModelMetadata>,
  saved_at_unix: u64,
}

/// Model metadata manager.
pub struct ModelMetadataManager {
  cache: RwLock<HashMap<String, ModelMetadata>>,
  cache_path: PathBuf,
  source_url: String,
}

impl ModelMetadataManager {
  /// Creates a manager at `<cache_dir>/models.json`.
  pub fn new(cache_dir: &Path) -> Self {
    Self {
      cache: RwLock::new(HashMap::new()),
      cache_path: cache_dir.join("models.json"),
      source_url: MODELS_DEV_URL.to_string(),
    }
  }

  /// Overrides the catalog URL.
  pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
    self.source_url = url.into();
    self
  }

  pub fn cache_path(&self) -> &Path {
    &self.cache_path
  }

  /// Loads cache from disk if present.
  pub async fn load_cache(&self) -> Result<usize> {
    if !self.cache_path.exists() {
      return Ok(0);
    }

    let data = tokio::fs::read_to_string(&self.cache_path)
      .await
      .map_err(|e| ModelError::InvalidResponse(format!("failed to read metadata cache: {e}")))?;
    let parsed = serde_json::from_str::<MetadataCache>(&data)
      .map_err(|e| ModelError::InvalidResponse(format!("failed to parse metadata cache: {e}")))?;
    let count = parsed.models.len();
    self.replace(parsed.models);
    Ok(count)
  }

  /// Saves cache to disk.
  pub async fn save_cache(&self) -> Result<()> {
    if let Some(parent) = self.cache_path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(|e| {
        ModelError::InvalidResponse(format!("failed to create metadata cache dir: {e}"))
      })?;
    }
    let payload = MetadataCache {
      models: self.snapshot(),
      saved_at_unix: chrono::Utc::now().timestamp().max(0) as u64,
    };
    let text = serde_json::to_string_pretty(&payload)?;
    tokio::fs::write(&self.cache_path, text)
      .await
      .map_err(|e| ModelError::InvalidResponse(format!("failed to write metadata cache: {e}")))?;
    Ok(())
  }

  /// Refreshes cache from models.dev and persists it.
  pub async fn refresh(&self) -> Result<usize> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;
    let response = client.get(&self.source_url).send().await?;
    if !response.status().is_success() {
      return Err(ModelError::ApiError {
        status: response.status().as_u16(),
        message: "failed to fetch models.dev".to_string(),
      });
    }
    let text = response.text().await?;
    let count = self.apply_models_dev_payload(&text)?;
    self.save_cache().await?;
    tracing::info!(models = count, url = %self.source_url, "model metadata refreshed");
    Ok(count)
  }

  /// Returns one metadata record.
  pub fn get(&self, provider_id: &str, model_id: &str) -> Option<ModelMetadata> {
    self
      .cache
      .read()
      .ok()?
      .get(&format!("{provider_id}/{model_id}"))
      .cloned()
  }

  pub fn len(&self) -> usize {
    self.cache.read().map(|c| c.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn snapshot(&self) -> HashMap<String, ModelMetadata> {
    self
      .cache
      .read()
      .map(|c| c.clone())
      .unwrap_or_default()
  }

  fn replace(&self, next: HashMap<String, ModelMetadata>) {
    match self.cache.write() {
      Ok(mut cache) => *cache = next,
      Err(poisoned) => *poisoned.into_inner() = next,
    }
  }

  fn apply_models_dev_payload(&self, json_payload: &str) -> Result<usize> {
    let parsed =
      serde_json::from_str::<HashMap<String, ProviderData>>(json_payload).map_err(|e| {
        ModelError::InvalidResponse(format!("failed to parse models.dev payload: {e}"))
      })?;

    let mut next = HashMap::new();
    for (provider_id, provider_data) in parsed {
      for (model_id, model) in provider_data.models {
        let full_id = format!("{provider_id}/{model_id}");
        next.insert(full_id.clone(), to_metadata(full_id, model));
      }
    }

    let count = next.len();
    self.replace(next);
    Ok(count)
  }
}

impl CapabilityCatalog for ModelMetadataManager {
  fn capabilities(&self, provider_id: &str, model_id: &str) -> Option<ModelCapabilities> {
    self.get(provider_id, model_id).map(|m| m.capabilities)
  }
}

fn to_metadata(id: String, model: ModelsDevModel) -> ModelMetadata {
  let image_input = model
    .modalities
    .unwrap_or_default()
    .input
    .iter()
    .any(|m| m == "image");

  ModelMetadata {
    id,
    name: model.name,
    capabilities: ModelCapabilities {
      reasoning: model.reasoning,
      temperature: model.temperature,
      vision: model.attachment || image_input,
      tool_call: model.tool_call,
    },
    limit: model.limit,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  const PAYLOAD: &str = r#"{
    "openai": {
      "models": {
        "gpt-4o": {
          "name": "GPT-4o",
          "release_date": "2024-05-13",
          "attachment": true,
          "reasoning": false,
          "temperature": true,
          "tool_call": true,
          "limit": {"context": 128000, "output": 16384},
          "modalities": {"input": ["text", "image"], "output": ["text"]}
        }
      }
    },
    "deepseek": {
      "models": {
        "deepseek-reasoner": {
          "name": "DeepSeek Reasoner",
          "reasoning": true,
          "temperature": false,
          "limit": {"context": 65536, "output": 8192}
        }
      }
    }
  }"#;

  #[test]
  fn test_apply_models_dev_payload() {
    let cache_dir = tempfile::tempdir().expect("tempdir");
    let manager = ModelMetadataManager::new(cache_dir.path());

    assert_eq!(manager.apply_models_dev_payload(PAYLOAD).expect("apply"), 2);

    let model = manager.get("openai", "gpt-4o").expect("metadata");
    assert_eq!(model.name, "GPT-4o");
    assert_eq!(model.limit.context, 128000);
    assert!(model.capabilities.vision);

    let caps = manager
      .capabilities("deepseek", "deepseek-reasoner")
      .expect("capabilities");
    assert!(caps.reasoning);
    assert!(!caps.temperature);
  }

  #[tokio::test]
  async fn refresh_fetches_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api.json"))
      .respond_with(ResponseTemplate::new(200).set_body_raw(PAYLOAD, "application/json"))
      .mount(&server)
      .await;

    let cache_dir = tempfile::tempdir().expect("tempdir");
    let manager = ModelMetadataManager::new(cache_dir.path())
      .with_source_url(format!("{}/api.json", server.uri()));
    assert_eq!(manager.refresh().await.expect("refresh"), 2);
    assert!(manager.cache_path().exists());

    let reloaded = ModelMetadataManager::new(cache_dir.path());
    assert!(reloaded.is_empty());
    assert_eq!(reloaded.load_cache().await.expect("load"), 2);
    assert!(reloaded.capabilities("openai", "gpt-4o").is_some());
  }

  #[tokio::test]
  async fn refresh_surfaces_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let cache_dir = tempfile::tempdir().expect("tempdir");
    let manager = ModelMetadataManager::new(cache_dir.path()).with_source_url(server.uri());
    let err = manager.refresh().await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
  }
}
