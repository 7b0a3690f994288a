//! Credential Rotation Manager
//!
//! Pools of interchangeable secrets keyed by provider key. One credential is
//! drawn per call according to the pool's strategy.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use arena_config::RotationStrategy;
use rand::Rng;
use thiserror::Error;

/// Rotation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RotationError {
  #[error("pool {0} needs at least one credential")]
  EmptyPool(String),

  #[error("pool {key} has {credentials} credentials but {weights} weights")]
  WeightsMismatch {
    key: String,
    credentials: usize,
    weights: usize,
  },

  #[error("pool {key} has an invalid weight {weight}")]
  InvalidWeight { key: String, weight: f64 },

  #[error("weighted pool {0} requires a weight for new credentials")]
  MissingWeight(String),
}

pub type Result<T> = std::result::Result<T, RotationError>;

/// One pool of credentials.
#[derive(Debug, Clone)]
struct CredentialPool {
  credentials: Vec<String>,
  strategy: RotationStrategy,
  weights: Option<Vec<f64>>,
  cursor: usize,
}

impl CredentialPool {
  fn round_robin(&mut self) -> String {
    let index = self.cursor % self.credentials.len();
    self.cursor = (index + 1) % self.credentials.len();
    self.credentials[index].clone()
  }

  fn select(&mut self, key: &str) -> String {
    match self.strategy {
      RotationStrategy::RoundRobin => self.round_robin(),
      RotationStrategy::Random => {
        let index = rand::thread_rng().gen_range(0..self.credentials.len());
        self.credentials[index].clone()
      }
      RotationStrategy::Weighted => match &self.weights {
        Some(weights) => {
          let total: f64 = weights.iter().sum();
          let mut draw = rand::thread_rng().gen_range(0.0..total);
          for (credential, weight) in self.credentials.iter().zip(weights) {
            if draw < *weight {
              return credential.clone();
            }
            draw -= weight;
          }
          // Float rounding can leave a sliver past the last bucket.
          self.credentials[self.credentials.len() - 1].clone()
        }
        None => {
          tracing::warn!(pool = key, "weighted pool has no weights, using round-robin");
          self.round_robin()
        }
      },
    }
  }
}

fn validate_weights(key: &str, weights: &[f64], credentials: usize) -> Result<()> {
  if weights.len() != credentials {
    return Err(RotationError::WeightsMismatch {
      key: key.to_string(),
      credentials,
      weights: weights.len(),
    });
  }
  if let Some(weight) = weights.iter().find(|w| !w.is_finite() || **w <= 0.0) {
    return Err(RotationError::InvalidWeight {
      key: key.to_string(),
      weight: *weight,
    });
  }
  Ok(())
}

fn build_pool(
  key: &str,
  credentials: Vec<String>,
  strategy: RotationStrategy,
  weights: Option<Vec<f64>>,
) -> Result<CredentialPool> {
  if credentials.is_empty() {
    return Err(RotationError::EmptyPool(key.to_string()));
  }
  let weights = match (strategy, weights) {
    (RotationStrategy::Weighted, Some(weights)) => {
      validate_weights(key, &weights, credentials.len())?;
      Some(weights)
    }
    _ => None,
  };

  tracing::debug!(pool = key, size = credentials.len(), strategy = %strategy, "credential pool registered");
  Ok(CredentialPool {
    credentials,
    strategy,
    weights,
    cursor: 0,
  })
}

/// Credential Rotation Manager
///
/// All pool state sits behind one mutex; every operation is a single lock
/// acquisition, so a round-robin read and cursor advance cannot interleave.
#[derive(Debug, Default)]
pub struct CredentialRotationManager {
  pools: Mutex<HashMap<String, CredentialPool>>,
}

impl CredentialRotationManager {
  pub fn new() -> Self {
    Self::default()
  }

  fn pools(&self) -> MutexGuard<'_, HashMap<String, CredentialPool>> {
    // Pool updates never leave a half-written state, so a poisoned lock is usable.
    self
      .pools
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Registers a pool, replacing any existing one under `key`.
  ///
  /// Weights are only kept for weighted pools.
  pub fn register_pool(
    &self,
    key: &str,
    credentials: Vec<String>,
    strategy: RotationStrategy,
    weights: Option<Vec<f64>>,
  ) -> Result<()> {
    let pool = build_pool(key, credentials, strategy, weights)?;
    self.pools().insert(key.to_string(), pool);
    Ok(())
  }

  /// Draws one credential, or `None` when no pool is registered under `key`.
  pub fn get_credential(&self, key: &str) -> Option<String> {
    let mut pools = self.pools();
    let pool = pools.get_mut(key)?;
    Some(pool.select(key))
  }

  /// Appends a credential.
  ///
  /// Weighted pools without weights get weight 1 backfilled for existing
  /// entries. An unknown key starts a new pool.
  pub fn add_credential(&self, key: &str, credential: String, weight: Option<f64>) -> Result<()> {
    if let Some(w) = weight
      && (!w.is_finite() || w <= 0.0)
    {
      return Err(RotationError::InvalidWeight {
        key: key.to_string(),
        weight: w,
      });
    }

    let mut pools = self.pools();
    let Some(pool) = pools.get_mut(key) else {
      let (strategy, weights) = match weight {
        Some(w) => (RotationStrategy::Weighted, Some(vec![w])),
        None => (RotationStrategy::RoundRobin, None),
      };
      pools.insert(
        key.to_string(),
        CredentialPool {
          credentials: vec![credential],
          strategy,
          weights,
          cursor: 0,
        },
      );
      return Ok(());
    };

    if pool.strategy == RotationStrategy::Weighted {
      let Some(w) = weight else {
        return Err(RotationError::MissingWeight(key.to_string()));
      };
      let weights = pool
        .weights
        .get_or_insert_with(|| vec![1.0; pool.credentials.len()]);
      if weights.len() != pool.credentials.len() {
        return Err(RotationError::WeightsMismatch {
          key: key.to_string(),
          credentials: pool.credentials.len(),
          weights: weights.len(),
        });
      }
      weights.push(w);
    }
    pool.credentials.push(credential);
    Ok(())
  }

  /// Removes a credential by value. Returns whether it was present.
  ///
  /// Removing the last credential drops the pool.
  pub fn remove_credential(&self, key: &str, credential: &str) -> bool {
    let mut pools = self.pools();
    let Some(pool) = pools.get_mut(key) else {
      return false;
    };
    let Some(index) = pool.credentials.iter().position(|c| c == credential) else {
      return false;
    };

    pool.credentials.remove(index);
    if let Some(weights) = pool.weights.as_mut()
      && index < weights.len()
    {
      weights.remove(index);
    }

    if pool.credentials.is_empty() {
      pools.remove(key);
    } else if pool.cursor >= pool.credentials.len() {
      pool.cursor = 0;
    }
    true
  }

  /// Drops every pool.
  pub fn clear(&self) {
    self.pools().clear();
  }

  /// Drops one pool. Returns whether it existed.
  pub fn clear_provider(&self, key: &str) -> bool {
    self.pools().remove(key).is_some()
  }

  /// Re-registers `key` only when `credentials` differ from the current pool,
  /// element by element. Returns whether a re-registration happened.
  ///
  /// The comparison and the replacement share one lock acquisition, so
  /// concurrent syncs of an unchanged list never reset the cursor.
  pub fn sync_pool(
    &self,
    key: &str,
    credentials: &[String],
    strategy: RotationStrategy,
  ) -> Result<bool> {
    let mut pools = self.pools();
    let unchanged = pools
      .get(key)
      .is_some_and(|pool| pool.strategy == strategy && pool.credentials == credentials);
    if unchanged {
      return Ok(false);
    }
    let pool = build_pool(key, credentials.to_vec(), strategy, None)?;
    pools.insert(key.to_string(), pool);
    Ok(true)
  }

  /// Snapshot of a pool's credentials.
  pub fn pool_credentials(&self, key: &str) -> Option<Vec<String>> {
    self.pools().get(key).map(|p| p.credentials.clone())
  }

  pub fn strategy(&self, key: &str) -> Option<RotationStrategy> {
    self.pools().get(key).map(|p| p.strategy)
  }

  pub fn has_pool(&self, key: &str) -> bool {
    self.pools().contains_key(key)
  }
}
