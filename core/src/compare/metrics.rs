//! Per-execution timing.

use std::time::{Duration, Instant};

use arena_protocol::{ExecutionMetrics, TokenUsage};

/// Throughput in tokens per second.
///
/// Absent without usage or when no measurable time elapsed.
pub fn tokens_per_second(usage: Option<&TokenUsage>, total_time_ms: u64) -> Option<f64> {
  let usage = usage?;
  if total_time_ms == 0 {
    return None;
  }
  Some(usage.total_tokens as f64 * 1000.0 / total_time_ms as f64)
}

/// Records dispatch time, first-token time and terminal time of one unit.
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
  started: Instant,
  first_token: Option<Duration>,
}

impl MetricsRecorder {
  /// Starts the clock at dispatch.
  pub fn start() -> Self {
    Self {
      started: Instant::now(),
      first_token: None,
    }
  }

  /// Marks the first text or reasoning delta. Later calls are ignored.
  ///
  /// Returns true on the first call.
  pub fn mark_first_token(&mut self) -> bool {
    if self.first_token.is_some() {
      return false;
    }
    self.first_token = Some(self.started.elapsed());
    true
  }

  pub fn has_first_token(&self) -> bool {
    self.first_token.is_some()
  }

  /// Stops the clock.
  pub fn finish(&self, usage: Option<&TokenUsage>) -> ExecutionMetrics {
    let total_time_ms = duration_ms(self.started.elapsed());
    ExecutionMetrics {
      total_time_ms,
      time_to_first_token_ms: self.first_token.map(duration_ms),
      tokens_per_second: tokens_per_second(usage, total_time_ms),
    }
  }
}

fn duration_ms(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
