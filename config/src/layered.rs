// Layered Configuration
// Support for layered configuration with precedence

use serde::{Deserialize, Serialize};

/// Layered configuration wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayeredConfig {
  /// Configuration layers, lowest precedence first
  layers: Vec<ConfigLayer>,
}

/// Configuration layer with source tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLayer {
  /// Layer source
  pub source: ConfigLayerSource,
  /// Configuration values
  pub values: toml::Value,
}

impl ConfigLayer {
  pub fn new(source: ConfigLayerSource, values: toml::Value) -> Self {
    Self { source, values }
  }
}

/// Configuration layer source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigLayerSource {
  /// Built-in defaults
  Default,
  /// Global user config
  GlobalConfig,
  /// Project-specific config
  ProjectConfig,
  /// CLI override
  CliOverride,
}

impl LayeredConfig {
  /// Create a new layered configuration
  pub fn new() -> Self {
    Self { layers: Vec::new() }
  }

  /// Add a layer on top of the existing ones
  pub fn add_layer(&mut self, layer: ConfigLayer) {
    self.layers.push(layer);
  }

  pub fn sources(&self) -> Vec<ConfigLayerSource> {
    self.layers.iter().map(|layer| layer.source).collect()
  }

  /// Get merged configuration.
  ///
  /// Tables merge key by key; any other value in a later layer replaces the
  /// earlier one.
  pub fn merge(&self) -> toml::Value {
    let mut merged = toml::Value::Table(toml::map::Map::new());
    for layer in &self.layers {
      Self::merge_into(&mut merged, &layer.values);
    }
    merged
  }

  fn merge_into(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
      (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
        for (key, value) in overlay_table {
          match base_table.get_mut(key) {
            Some(existing) => Self::merge_into(existing, value),
            None => {
              base_table.insert(key.clone(), value.clone());
            }
          }
        }
      }
      (base, overlay) => *base = overlay.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn table(src: &str) -> toml::Value {
    toml::from_str(src).expect("valid toml")
  }

  #[test]
  fn nested_tables_merge_key_by_key() {
    let mut layered = LayeredConfig::new();
    layered.add_layer(ConfigLayer::new(
      ConfigLayerSource::Default,
      table("[orchestrator]\nchannel_capacity = 256\nlookup_retries = 2\n"),
    ));
    layered.add_layer(ConfigLayer::new(
      ConfigLayerSource::ProjectConfig,
      table("[orchestrator]\nlookup_retries = 5\n"),
    ));

    assert_eq!(
      layered.merge(),
      table("[orchestrator]\nchannel_capacity = 256\nlookup_retries = 5\n")
    );
    assert_eq!(
      layered.sources(),
      vec![ConfigLayerSource::Default, ConfigLayerSource::ProjectConfig]
    );
  }

  #[test]
  fn scalar_replaces_table() {
    let mut layered = LayeredConfig::new();
    layered.add_layer(ConfigLayer::new(
      ConfigLayerSource::Default,
      table("[logging]\nfilter = \"info\"\n"),
    ));
    layered.add_layer(ConfigLayer::new(
      ConfigLayerSource::CliOverride,
      table("logging = \"off\"\n"),
    ));

    assert_eq!(layered.merge(), table("logging = \"off\"\n"));
  }
}
