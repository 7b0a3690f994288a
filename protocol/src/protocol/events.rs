use serde::{Deserialize, Serialize};

use super::result::{ExecutionMetrics, ExecutionResult, ExecutionStatus, TokenUsage};

/// Payload of the end-of-stream sentinel line.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Typed event of a streaming comparison.
///
/// `index` is the position of the model entry in the request, so two entries
/// naming the same (provider, model) pair stay distinguishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
  /// Incremental output text of one model.
  Chunk {
    index: usize,
    provider: String,
    model: String,
    chunk: String,
  },
  /// Incremental reasoning text of one reasoning model.
  Reasoning {
    index: usize,
    provider: String,
    model: String,
    chunk: String,
  },
  /// Terminal event of one model.
  Complete {
    index: usize,
    provider: String,
    model: String,
    status: ExecutionStatus,
    metrics: ExecutionMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<TokenUsage>,
    #[serde(default, rename = "statusCode", skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
  },
  /// Call-level failure not attributable to a single model.
  Error { error: String },
}

impl StreamEvent {
  pub fn complete(index: usize, result: &ExecutionResult) -> Self {
    Self::Complete {
      index,
      provider: result.provider_id.clone(),
      model: result.model_id.clone(),
      status: result.status,
      metrics: result.metrics.clone(),
      error: result.error_message.clone(),
      usage: result.usage,
      status_code: result.status_code,
    }
  }

  /// Request position this event belongs to, `None` for call-level events.
  pub fn index(&self) -> Option<usize> {
    match self {
      Self::Chunk { index, .. } | Self::Reasoning { index, .. } | Self::Complete { index, .. } => {
        Some(*index)
      }
      Self::Error { .. } => None,
    }
  }

  pub fn is_complete(&self) -> bool {
    matches!(self, Self::Complete { .. })
  }
}

/// One item of the multiplexed stream: an event or the terminating sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
  Event(StreamEvent),
  Done,
}

impl StreamFrame {
  /// Renders the frame as one `text/event-stream` message.
  pub fn to_sse(&self) -> String {
    match self {
      Self::Event(event) => match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(err) => format!(
          "data: {}\n\n",
          serde_json::json!({"type": "error", "error": err.to_string()})
        ),
      },
      Self::Done => format!("data: {DONE_SENTINEL}\n\n"),
    }
  }

  /// Parses the payload of one `data:` line.
  pub fn from_sse_data(data: &str) -> serde_json::Result<Self> {
    let data = data.trim();
    if data == DONE_SENTINEL {
      return Ok(Self::Done);
    }
    serde_json::from_str(data).map(Self::Event)
  }

  pub fn is_done(&self) -> bool {
    matches!(self, Self::Done)
  }
}

impl From<StreamEvent> for StreamFrame {
  fn from(event: StreamEvent) -> Self {
    Self::Event(event)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn chunk_event_wire_shape() {
    let frame = StreamFrame::Event(StreamEvent::Chunk {
      index: 0,
      provider: "openai".to_string(),
      model: "gpt-4o".to_string(),
      chunk: "Hel".to_string(),
    });

    assert_eq!(
      frame.to_sse(),
      "data: {\"type\":\"chunk\",\"index\":0,\"provider\":\"openai\",\"model\":\"gpt-4o\",\"chunk\":\"Hel\"}\n\n"
    );
  }

  #[test]
  fn done_sentinel_is_not_json() {
    assert_eq!(StreamFrame::Done.to_sse(), "data: [DONE]\n\n");
    assert_eq!(
      StreamFrame::from_sse_data(" [DONE] ").expect("parse sentinel"),
      StreamFrame::Done
    );
  }

  #[test]
  fn complete_event_parses_back() {
    let result = ExecutionResult::failed(
      "anthropic",
      "claude-sonnet-4-20250514",
      "credential not authorized",
      Some(403),
      ExecutionMetrics::default(),
    );
    let frame = StreamFrame::Event(StreamEvent::complete(2, &result));
    let line = frame.to_sse();
    let data = line
      .strip_prefix("data: ")
      .and_then(|rest| rest.strip_suffix("\n\n"))
      .expect("sse framing");

    let value: serde_json::Value = serde_json::from_str(data).expect("json payload");
    assert_eq!(value["type"], "complete");
    assert_eq!(value["status"], "failed");
    assert_eq!(value["statusCode"], 403);
    assert_eq!(value["error"], "credential not authorized");

    let parsed = StreamFrame::from_sse_data(data).expect("parse frame");
    assert_eq!(parsed, frame);
  }

  #[test]
  fn error_event_has_no_index() {
    let event = StreamEvent::Error {
      error: "lookup unavailable".to_string(),
    };
    assert_eq!(event.index(), None);
    assert!(!event.is_complete());
  }
}
