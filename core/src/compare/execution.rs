//! One model's execution unit.

use std::sync::Arc;
use std::time::Duration;

use arena_protocol::{ExecutionResult, ExecutionStatus, StreamEvent, StreamFrame, TokenUsage};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::metrics::MetricsRecorder;
use crate::model::{ChatRequest, Chunk, ModelError, ModelProvider};

/// Everything a unit needs to run without touching shared state.
pub(crate) struct ExecutionUnit {
  pub index: usize,
  pub provider_id: String,
  pub model_id: String,
  pub client: Arc<dyn ModelProvider>,
  pub request: ChatRequest,
  pub timeout: Duration,
  pub cancel: CancellationToken,
  /// Set for streaming calls
  pub events: Option<mpsc::Sender<StreamFrame>>,
}

#[derive(Default)]
struct UnitOutput {
  text: String,
  reasoning: String,
  usage: Option<TokenUsage>,
}

enum Outcome {
  Completed,
  Failed(ModelError),
  Cancelled,
  TimedOut,
}

impl ExecutionUnit {
  /// Runs to a terminal result. Never panics on provider errors.
  pub async fn run(self) -> ExecutionResult {
    let mut recorder = MetricsRecorder::start();
    let mut output = UnitOutput::default();

    let outcome = tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Outcome::Cancelled,
      _ = tokio::time::sleep(self.timeout) => Outcome::TimedOut,
      outcome = self.drive(&mut recorder, &mut output) => outcome,
    };

    let metrics = recorder.finish(output.usage.as_ref());

    // A dropped connection is also reported call-wide, ahead of the complete.
    if let Outcome::Failed(err) = &outcome
      && err.is_transport()
    {
      self
        .emit(StreamEvent::Error {
          error: format!("{}/{}: {err}", self.provider_id, self.model_id),
        })
        .await;
    }

    let result = match outcome {
      Outcome::Completed => ExecutionResult {
        provider_id: self.provider_id.clone(),
        model_id: self.model_id.clone(),
        status: ExecutionStatus::Success,
        text: Some(output.text),
        reasoning: (!output.reasoning.is_empty()).then_some(output.reasoning),
        usage: output.usage,
        metrics,
        error_message: None,
        status_code: None,
      },
      Outcome::Failed(err) => {
        tracing::warn!(index = self.index, provider = %self.provider_id, model = %self.model_id, error = %err, "model execution failed");
        ExecutionResult::failed(
          &self.provider_id,
          &self.model_id,
          err.to_string(),
          err.status_code(),
          metrics,
        )
      }
      Outcome::TimedOut => {
        tracing::warn!(index = self.index, provider = %self.provider_id, model = %self.model_id, "model execution timed out");
        ExecutionResult::failed(
          &self.provider_id,
          &self.model_id,
          ModelError::Timeout(format!("no result after {}s", self.timeout.as_secs())).to_string(),
          Some(504),
          metrics,
        )
      }
      Outcome::Cancelled => ExecutionResult::cancelled(
        &self.provider_id,
        &self.model_id,
        (!output.text.is_empty()).then_some(output.text),
        metrics,
      ),
    };

    tracing::debug!(
      index = self.index,
      provider = %self.provider_id,
      model = %self.model_id,
      status = %result.status,
      total_ms = result.metrics.total_time_ms,
      "model execution finished"
    );
    result
  }

  async fn drive(&self, recorder: &mut MetricsRecorder, output: &mut UnitOutput) -> Outcome {
    if self.events.is_none() {
      return match self.client.chat_completion(self.request.clone()).await {
        Ok(response) => {
          output.text = response.text;
          output.reasoning = response.reasoning.unwrap_or_default();
          output.usage = response.usage;
          Outcome::Completed
        }
        Err(err) => Outcome::Failed(err),
      };
    }

    let mut stream = match self.client.chat_completion_stream(self.request.clone()).await {
      Ok(stream) => stream,
      Err(err) => return Outcome::Failed(err),
    };

    while let Some(item) = stream.next().await {
      match item {
        Ok(Chunk::Text(text)) => {
          if text.is_empty() {
            continue;
          }
          if recorder.mark_first_token() {
            tracing::debug!(index = self.index, model = %self.model_id, "first token");
          }
          output.text.push_str(&text);
          if !self.emit(StreamEvent::Chunk {
            index: self.index,
            provider: self.provider_id.clone(),
            model: self.model_id.clone(),
            chunk: text,
          })
          .await
          {
            return Outcome::Cancelled;
          }
        }
        Ok(Chunk::Reasoning(text)) => {
          if text.is_empty() {
            continue;
          }
          recorder.mark_first_token();
          output.reasoning.push_str(&text);
          if !self.emit(StreamEvent::Reasoning {
            index: self.index,
            provider: self.provider_id.clone(),
            model: self.model_id.clone(),
            chunk: text,
          })
          .await
          {
            return Outcome::Cancelled;
          }
        }
        Ok(Chunk::Usage(usage)) => output.usage = Some(usage),
        Ok(Chunk::Done) => return Outcome::Completed,
        Err(err) => return Outcome::Failed(err),
      }
    }
    Outcome::Completed
  }

  /// Pushes an event. False once the consumer is gone.
  async fn emit(&self, event: StreamEvent) -> bool {
    match &self.events {
      Some(tx) => tx.send(StreamFrame::Event(event)).await.is_ok(),
      None => true,
    }
  }
}
