// Configuration Loader
// Layered configuration loading system

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
use crate::types::Config;

/// Directory name holding config files, under the home and project dirs
pub const CONFIG_DIR_NAME: &str = ".arena";

/// Configuration loader with layered support
pub struct ConfigLoader {
  /// Global config directory
  global_dir: PathBuf,
  /// Project config directory
  project_dir: Option<PathBuf>,
}

impl ConfigLoader {
  /// Create a new configuration loader
  pub fn new() -> Self {
    let global_dir = dirs::home_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join(CONFIG_DIR_NAME);

    Self {
      global_dir,
      project_dir: None,
    }
  }

  /// Replace the global config directory
  pub fn with_global_dir(mut self, dir: PathBuf) -> Self {
    self.global_dir = dir;
    self
  }

  /// Set project directory
  pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
    self.project_dir = Some(dir);
    self
  }

  /// Load configuration with CLI overrides
  pub fn load_with_cli_overrides(&self, cli_overrides: Vec<(String, String)>) -> Result<Config> {
    // Layers in order:
    // 1. Built-in defaults
    // 2. Global config (~/.arena/config.toml)
    // 3. Project config (.arena/config.toml)
    // 4. CLI overrides
    let mut layered = LayeredConfig::new();
    layered.add_layer(ConfigLayer::new(
      ConfigLayerSource::Default,
      toml::Value::try_from(Config::default()).context("serialize default config")?,
    ));

    if let Some(values) = Self::read_layer(&self.global_dir.join("config.toml"))? {
      layered.add_layer(ConfigLayer::new(ConfigLayerSource::GlobalConfig, values));
    }

    if let Some(project_dir) = &self.project_dir {
      let path = project_dir.join(CONFIG_DIR_NAME).join("config.toml");
      if let Some(values) = Self::read_layer(&path)? {
        layered.add_layer(ConfigLayer::new(ConfigLayerSource::ProjectConfig, values));
      }
    }

    for (key, value) in cli_overrides {
      layered.add_layer(ConfigLayer::new(
        ConfigLayerSource::CliOverride,
        Self::override_value(&key, &value)?,
      ));
    }

    let merged = layered.merge();
    let config: Config = merged.try_into().context("invalid configuration")?;
    tracing::debug!(sources = ?layered.sources(), "configuration loaded");
    Ok(config)
  }

  /// Read one config file. A missing file is not an error.
  fn read_layer(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read {}", path.display()))?;
    let values: toml::Value =
      toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(values))
  }

  /// Turn `a.b.c=value` into a nested table.
  ///
  /// The value is read as a TOML literal when it parses as one and as a bare
  /// string otherwise, so `orchestrator.lookup_retries=4` and
  /// `rotation.strategy=random` both work.
  fn override_value(key: &str, value: &str) -> Result<toml::Value> {
    let segments: Vec<&str> = key.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
      anyhow::bail!("Invalid config key: {key}");
    }

    let parsed = toml::from_str::<toml::Table>(&format!("v = {value}"))
      .ok()
      .and_then(|mut t| t.remove("v"))
      .unwrap_or_else(|| toml::Value::String(value.to_string()));

    let mut node = parsed;
    for segment in segments.iter().rev() {
      let mut table = toml::map::Map::new();
      table.insert((*segment).to_string(), node);
      node = toml::Value::Table(table);
    }
    Ok(node)
  }
}

impl Default for ConfigLoader {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::RotationStrategy;
  use arena_protocol::ExecutionMode;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  fn write_config(dir: &Path, body: &str) {
    std::fs::create_dir_all(dir).expect("create config dir");
    std::fs::write(dir.join("config.toml"), body).expect("write config");
  }

  #[test]
  fn defaults_when_no_files() {
    let home = TempDir::new().expect("tempdir");
    let config = ConfigLoader::new()
      .with_global_dir(home.path().join(CONFIG_DIR_NAME))
      .load_with_cli_overrides(vec![])
      .expect("load config");
    assert_eq!(config, Config::default());
  }

  #[test]
  fn project_overrides_global_field_by_field() {
    let home = TempDir::new().expect("tempdir");
    let project = TempDir::new().expect("tempdir");
    write_config(
      &home.path().join(CONFIG_DIR_NAME),
      "[orchestrator]\nchannel_capacity = 64\nlookup_retries = 1\n\n[rotation]\nstrategy = \"random\"\n",
    );
    write_config(
      &project.path().join(CONFIG_DIR_NAME),
      "[orchestrator]\nlookup_retries = 4\n",
    );

    let config = ConfigLoader::new()
      .with_global_dir(home.path().join(CONFIG_DIR_NAME))
      .with_project_dir(project.path().to_path_buf())
      .load_with_cli_overrides(vec![])
      .expect("load config");

    assert_eq!(config.orchestrator.channel_capacity, 64);
    assert_eq!(config.orchestrator.lookup_retries, 4);
    assert_eq!(config.rotation.strategy, RotationStrategy::Random);
  }

  #[test]
  fn cli_overrides_win() {
    let home = TempDir::new().expect("tempdir");
    let config = ConfigLoader::new()
      .with_global_dir(home.path().join(CONFIG_DIR_NAME))
      .load_with_cli_overrides(vec![
        ("orchestrator.request_timeout_secs".to_string(), "5".to_string()),
        ("orchestrator.default_mode".to_string(), "sequential".to_string()),
        ("rotation.strategy".to_string(), "weighted".to_string()),
        (
          "providers.deepseek.base_url".to_string(),
          "https://proxy.local".to_string(),
        ),
      ])
      .expect("load config");

    assert_eq!(config.orchestrator.request_timeout_secs, 5);
    assert_eq!(config.orchestrator.default_mode, ExecutionMode::Sequential);
    assert_eq!(config.rotation.strategy, RotationStrategy::Weighted);
    assert_eq!(
      config.provider_base_url("deepseek"),
      Some("https://proxy.local")
    );
  }

  #[test]
  fn bad_override_type_is_rejected() {
    let home = TempDir::new().expect("tempdir");
    let err = ConfigLoader::new()
      .with_global_dir(home.path().join(CONFIG_DIR_NAME))
      .load_with_cli_overrides(vec![(
        "orchestrator.channel_capacity".to_string(),
        "lots".to_string(),
      )]);
    assert!(err.is_err());
  }

  #[test]
  fn malformed_file_is_an_error() {
    let home = TempDir::new().expect("tempdir");
    write_config(&home.path().join(CONFIG_DIR_NAME), "[orchestrator\n");
    let err = ConfigLoader::new()
      .with_global_dir(home.path().join(CONFIG_DIR_NAME))
      .load_with_cli_overrides(vec![]);
    assert!(err.is_err());
  }
}
