//! Comparison orchestration and stream multiplexing.

mod execution;
pub mod metrics;
mod orchestrator;
mod stream;

use thiserror::Error;

use crate::credentials::LookupError;

pub use metrics::{MetricsRecorder, tokens_per_second};
pub use orchestrator::{ComparisonOrchestrator, ComparisonOutput, UNKNOWN_PROVIDER};
pub use stream::ComparisonStream;

/// Call-level failures. Per-model failures never surface here; they become
/// failed results instead.
#[derive(Error, Debug)]
pub enum CompareError {
  #[error("credential lookup failed after {attempts} attempts: {source}")]
  CredentialLookup {
    attempts: u32,
    #[source]
    source: LookupError,
  },

  /// Cancelled before credentials resolved. The public entry points turn this
  /// into one Cancelled record per model.
  #[error("comparison cancelled")]
  Cancelled,
}

impl CompareError {
  /// HTTP-style status for outer surfaces.
  pub fn status_code(&self) -> Option<u16> {
    match self {
      Self::CredentialLookup { .. } => Some(503),
      Self::Cancelled => None,
    }
  }
}
