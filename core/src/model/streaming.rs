//! Unified streaming helpers.
//!
//! [`StreamingProcessor`] cuts a `text/event-stream` body into events and hands
//! each JSON payload to a family-specific [`StreamParser`].

use arena_protocol::TokenUsage;
use serde_json::Value;

use super::error::Result;
use super::types::Chunk;

/// Per-family event parser.
pub trait StreamParser: Send {
  /// Turns one decoded `data:` payload into chunks.
  ///
  /// Returning [`Chunk::Done`] marks the family's own end-of-message event.
  fn parse(&mut self, data: &Value) -> Result<Vec<Chunk>>;

  /// Usage accumulated so far.
  fn usage(&self) -> Option<TokenUsage>;
}

/// Streaming processor configuration.
pub struct StreamingConfig {
  pub separator: &'static str,
  pub parser: Box<dyn StreamParser>,
}

impl StreamingConfig {
  pub fn sse(parser: Box<dyn StreamParser>) -> Self {
    Self {
      separator: "\n\n",
      parser,
    }
  }
}

/// Stateful SSE streaming parser.
///
/// Emits at most one [`Chunk::Done`], always preceded by [`Chunk::Usage`] when
/// the parser saw usage.
pub struct StreamingProcessor {
  config: StreamingConfig,
  buffer: String,
  /// Trailing bytes of a UTF-8 sequence split across network reads
  pending: Vec<u8>,
  done: bool,
}

impl StreamingProcessor {
  pub fn new(config: StreamingConfig) -> Self {
    Self {
      config,
      buffer: String::new(),
      pending: Vec::new(),
      done: false,
    }
  }

  pub fn is_done(&self) -> bool {
    self.done
  }

  /// Feeds one text segment and returns normalized chunks.
  pub fn push_text(&mut self, text: &str) -> Result<Vec<Chunk>> {
    self.buffer.push_str(&text.replace("\r\n", "\n"));
    let mut chunks = Vec::new();
    while let Some(idx) = self.buffer.find(self.config.separator) {
      let event = self.buffer[..idx].to_string();
      self.buffer.drain(..idx + self.config.separator.len());
      self.parse_event(&event, &mut chunks)?;
    }
    Ok(chunks)
  }

  /// Feeds raw bytes, holding back an incomplete trailing UTF-8 sequence.
  pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<Vec<Chunk>> {
    self.pending.extend_from_slice(bytes);
    let valid = match std::str::from_utf8(&self.pending) {
      Ok(_) => self.pending.len(),
      Err(err) if err.error_len().is_none() => err.valid_up_to(),
      Err(_) => self.pending.len(),
    };
    let rest = self.pending.split_off(valid);
    let text = String::from_utf8_lossy(&self.pending).into_owned();
    self.pending = rest;
    self.push_text(&text)
  }

  /// Flushes the remaining buffer and closes the stream.
  pub fn finish(&mut self) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    if !self.pending.is_empty() {
      let tail = std::mem::take(&mut self.pending);
      self.buffer.push_str(&String::from_utf8_lossy(&tail));
    }
    let remaining = std::mem::take(&mut self.buffer);
    if !remaining.trim().is_empty() {
      self.parse_event(&remaining, &mut chunks)?;
    }
    self.close(&mut chunks);
    Ok(chunks)
  }

  fn parse_event(&mut self, raw: &str, out: &mut Vec<Chunk>) -> Result<()> {
    if self.done {
      return Ok(());
    }

    let payload = data_payload(raw);
    if payload.is_empty() {
      return Ok(());
    }
    if payload == "[DONE]" {
      self.close(out);
      return Ok(());
    }

    let Ok(value) = serde_json::from_str::<Value>(&payload) else {
      tracing::debug!(payload = %payload, "skipping non-JSON stream event");
      return Ok(());
    };

    for chunk in self.config.parser.parse(&value)? {
      if chunk == Chunk::Done {
        self.close(out);
        break;
      }
      out.push(chunk);
    }
    Ok(())
  }

  fn close(&mut self, out: &mut Vec<Chunk>) {
    if self.done {
      return;
    }
    self.done = true;
    if let Some(usage) = self.config.parser.usage() {
      out.push(Chunk::Usage(usage));
    }
    out.push(Chunk::Done);
  }
}

/// Joins the `data:` lines of one event. `event:`/`id:` lines and comments are dropped.
fn data_payload(raw: &str) -> String {
  raw
    .lines()
    .filter_map(|line| line.strip_prefix("data:"))
    .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_string()
}

/// Reads usage from any of the field spellings the supported APIs use.
pub fn parse_usage(value: &Value) -> Option<TokenUsage> {
  let field = |names: &[&str]| {
    names
      .iter()
      .find_map(|name| value.get(*name).and_then(Value::as_u64))
      .map(|n| n as u32)
  };

  let input_tokens = field(&["prompt_tokens", "input_tokens", "promptTokenCount"]);
  let output_tokens = field(&["completion_tokens", "output_tokens", "candidatesTokenCount"]);
  let total_tokens = field(&["total_tokens", "totalTokenCount"]);

  if input_tokens.is_none() && output_tokens.is_none() && total_tokens.is_none() {
    return None;
  }

  Some(TokenUsage::new(
    input_tokens.unwrap_or(0),
    output_tokens.unwrap_or(0),
    total_tokens,
  ))
}
