//! Credential lookup
//!
//! Requests carry opaque credential references. A [`CredentialLookup`]
//! resolves the references a caller is allowed to use; anything it leaves out
//! is treated as not authorized.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Credential material behind one reference.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
  /// Underlying provider id; governs the wire format even behind a proxy
  pub provider_family: String,
  /// Interchangeable secrets, rotated per call
  pub secrets: Vec<String>,
  /// Proxy or self-hosted base URL
  pub proxy_base_url: Option<String>,
}

impl std::fmt::Debug for ResolvedCredential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResolvedCredential")
      .field("provider_family", &self.provider_family)
      .field("secrets", &format_args!("[{} redacted]", self.secrets.len()))
      .field("proxy_base_url", &self.proxy_base_url)
      .finish()
  }
}

/// Lookup errors
#[derive(Error, Debug)]
pub enum LookupError {
  /// The backing store could not be reached
  #[error("credential store unavailable: {0}")]
  Unavailable(String),

  /// Credential file problems
  #[error("invalid credential file: {0}")]
  InvalidFile(String),
}

/// Resolves credential references for a caller identity.
#[async_trait]
pub trait CredentialLookup: Send + Sync {
  /// Returns the subset of `refs` that `caller` may use.
  async fn resolve(
    &self,
    caller: &str,
    refs: &[String],
  ) -> Result<HashMap<String, ResolvedCredential>, LookupError>;
}

/// On-disk shape of a credential file.
#[derive(Debug, Deserialize)]
struct CredentialFile {
  #[serde(default)]
  credentials: Vec<CredentialEntry>,
}

#[derive(Debug, Deserialize)]
struct CredentialEntry {
  id: String,
  owner: String,
  provider: String,
  #[serde(default)]
  secrets: Vec<String>,
  #[serde(default)]
  secret: Option<String>,
  #[serde(default)]
  base_url: Option<String>,
}

/// In-memory, owner-keyed credential store.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialLookup {
  by_owner: HashMap<String, HashMap<String, ResolvedCredential>>,
}

impl StaticCredentialLookup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a credential owned by `owner` under reference `id`.
  pub fn insert(&mut self, owner: &str, id: &str, credential: ResolvedCredential) {
    self
      .by_owner
      .entry(owner.to_string())
      .or_default()
      .insert(id.to_string(), credential);
  }

  /// Builder form of [`Self::insert`].
  pub fn with(mut self, owner: &str, id: &str, credential: ResolvedCredential) -> Self {
    self.insert(owner, id, credential);
    self
  }

  /// Parses a TOML credential file:
  ///
  /// ```toml
  /// [[credentials]]
  /// id = "team-openai"
  /// owner = "alice"
  /// provider = "openai"
  /// secrets = ["sk-1", "sk-2"]
  /// base_url = "https://gateway.internal"   # optional
  /// ```
  pub fn from_toml_str(content: &str) -> Result<Self, LookupError> {
    let file: CredentialFile =
      toml::from_str(content).map_err(|e| LookupError::InvalidFile(e.to_string()))?;

    let mut lookup = Self::new();
    for entry in file.credentials {
      let mut secrets = entry.secrets;
      if let Some(secret) = entry.secret {
        secrets.push(secret);
      }
      if secrets.is_empty() {
        return Err(LookupError::InvalidFile(format!(
          "credential {} has no secrets",
          entry.id
        )));
      }
      lookup.insert(
        &entry.owner,
        &entry.id,
        ResolvedCredential {
          provider_family: entry.provider,
          secrets,
          proxy_base_url: entry.base_url,
        },
      );
    }
    Ok(lookup)
  }

  pub fn load(path: &Path) -> Result<Self, LookupError> {
    let content = std::fs::read_to_string(path)
      .map_err(|e| LookupError::InvalidFile(format!("{}: {e}", path.display())))?;
    Self::from_toml_str(&content)
  }
}

#[async_trait]
impl CredentialLookup for StaticCredentialLookup {
  async fn resolve(
    &self,
    caller: &str,
    refs: &[String],
  ) -> Result<HashMap<String, ResolvedCredential>, LookupError> {
    let Some(owned) = self.by_owner.get(caller) else {
      return Ok(HashMap::new());
    };
    Ok(
      refs
        .iter()
        .filter_map(|r| owned.get(r).map(|c| (r.clone(), c.clone())))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  const FILE: &str = r#"
    [[credentials]]
    id = "k1"
    owner = "alice"
    provider = "openai"
    secrets = ["sk-1", "sk-2"]

    [[credentials]]
    id = "k2"
    owner = "bob"
    provider = "anthropic"
    secret = "sk-ant"
    base_url = "https://gateway.internal/anthropic"
  "#;

  #[tokio::test]
  async fn resolves_only_owned_refs() {
    let lookup = StaticCredentialLookup::from_toml_str(FILE).expect("parse");
    let refs = vec!["k1".to_string(), "k2".to_string()];

    let alice = lookup.resolve("alice", &refs).await.expect("resolve");
    assert_eq!(alice.len(), 1);
    assert_eq!(alice["k1"].secrets, vec!["sk-1".to_string(), "sk-2".to_string()]);

    let bob = lookup.resolve("bob", &refs).await.expect("resolve");
    assert_eq!(
      bob["k2"].proxy_base_url.as_deref(),
      Some("https://gateway.internal/anthropic")
    );

    assert!(lookup.resolve("mallory", &refs).await.expect("resolve").is_empty());
  }

  #[test]
  fn entry_without_secret_is_rejected() {
    let err = StaticCredentialLookup::from_toml_str(
      "[[credentials]]\nid = \"k\"\nowner = \"o\"\nprovider = \"openai\"\n",
    )
    .unwrap_err();
    assert!(matches!(err, LookupError::InvalidFile(_)));
  }

  #[test]
  fn debug_output_hides_secrets() {
    let credential = ResolvedCredential {
      provider_family: "openai".to_string(),
      secrets: vec!["sk-very-secret".to_string()],
      proxy_base_url: None,
    };
    let rendered = format!("{credential:?}");
    assert!(!rendered.contains("sk-very-secret"));
    assert!(rendered.contains("1 redacted"));
  }
}
