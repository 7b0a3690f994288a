//! Comparison Orchestrator
//!
//! Fans one comparison out to every requested model, isolates their
//! failures, and either aggregates the terminal results or multiplexes their
//! events onto one ordered stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arena_config::{Config, OrchestratorConfig, RotationStrategy};
use arena_protocol::{
  ChatMessage, ComparisonRequest, ComparisonResponse, ExecutionMetrics, ExecutionMode,
  ExecutionResult, ExecutionStatus, ModelRequestSpec, StreamEvent, StreamFrame,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::CompareError;
use super::execution::ExecutionUnit;
use super::stream::ComparisonStream;
use crate::credentials::{CredentialLookup, CredentialRotationManager, ResolvedCredential};
use crate::model::{CapabilityResolver, ChatRequest, ProviderFactory};

/// Provider id reported when a credential reference did not resolve.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Result of [`ComparisonOrchestrator::run`].
#[derive(Debug)]
pub enum ComparisonOutput {
  Response(ComparisonResponse),
  Stream(ComparisonStream),
}

/// Cancellation tokens of one call. Unit tokens are children of the root.
#[derive(Clone)]
struct CallTokens {
  root: CancellationToken,
  units: Vec<CancellationToken>,
}

impl CallTokens {
  fn new(root: CancellationToken, models: usize) -> Self {
    let units = (0..models).map(|_| root.child_token()).collect();
    Self { root, units }
  }
}

/// Comparison Orchestrator
#[derive(Clone)]
pub struct ComparisonOrchestrator {
  factory: Arc<dyn ProviderFactory>,
  resolver: Arc<CapabilityResolver>,
  rotation: Arc<CredentialRotationManager>,
  lookup: Arc<dyn CredentialLookup>,
  settings: OrchestratorConfig,
  rotation_strategy: RotationStrategy,
}

impl ComparisonOrchestrator {
  pub fn new(
    factory: Arc<dyn ProviderFactory>,
    resolver: Arc<CapabilityResolver>,
    rotation: Arc<CredentialRotationManager>,
    lookup: Arc<dyn CredentialLookup>,
    config: &Config,
  ) -> Self {
    Self {
      factory,
      resolver,
      rotation,
      lookup,
      settings: config.orchestrator.clone(),
      rotation_strategy: pool_strategy(config.rotation.strategy),
    }
  }

  pub fn rotation(&self) -> &CredentialRotationManager {
    &self.rotation
  }

  /// Runs a comparison in the shape its `streaming` option asks for.
  pub async fn run(
    &self,
    caller: &str,
    request: ComparisonRequest,
  ) -> Result<ComparisonOutput, CompareError> {
    if request.options.streaming {
      Ok(ComparisonOutput::Stream(self.compare_stream(caller, request)))
    } else {
      self.compare(caller, request).await.map(ComparisonOutput::Response)
    }
  }

  /// Non-streaming comparison. Results come back in request order.
  pub async fn compare(
    &self,
    caller: &str,
    request: ComparisonRequest,
  ) -> Result<ComparisonResponse, CompareError> {
    self
      .compare_with_cancel(caller, request, CancellationToken::new())
      .await
  }

  /// Like [`Self::compare`], cancelled through `cancel`.
  ///
  /// Dropping the returned future cancels every model still running. A call
  /// cancelled before its credentials resolve yields one Cancelled result per
  /// model.
  pub async fn compare_with_cancel(
    &self,
    caller: &str,
    request: ComparisonRequest,
    cancel: CancellationToken,
  ) -> Result<ComparisonResponse, CompareError> {
    let root = cancel.child_token();
    let _guard = root.clone().drop_guard();
    let tokens = CallTokens::new(root, request.models.len());
    let results = match self.execute(caller, &request, &tokens, None).await {
      Ok(results) => results,
      Err(CompareError::Cancelled) => request
        .models
        .iter()
        .map(|spec| {
          ExecutionResult::cancelled(UNKNOWN_PROVIDER, &spec.model_id, None, ExecutionMetrics::default())
        })
        .collect(),
      Err(err) => return Err(err),
    };
    Ok(ComparisonResponse { results })
  }

  /// Streaming comparison. Returns at once; models run in the background and
  /// report through the returned stream. Must be called inside a Tokio
  /// runtime.
  pub fn compare_stream(&self, caller: &str, request: ComparisonRequest) -> ComparisonStream {
    let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
    let tokens = CallTokens::new(CancellationToken::new(), request.models.len());
    let stream = ComparisonStream::new(rx, tokens.root.clone(), tokens.units.clone());

    let this = self.clone();
    let caller = caller.to_string();
    tokio::spawn(async move {
      if let Err(err) = this.execute(&caller, &request, &tokens, Some(&tx)).await {
        fail_all(&request.models, &err, &tx).await;
      }
      let _ = tx.send(StreamFrame::Done).await;
    });

    stream
  }

  async fn execute(
    &self,
    caller: &str,
    request: &ComparisonRequest,
    tokens: &CallTokens,
    events: Option<&mpsc::Sender<StreamFrame>>,
  ) -> Result<Vec<ExecutionResult>, CompareError> {
    let call_id = Uuid::new_v4();
    let span = tracing::info_span!("compare", %call_id);
    let mode = request.options.mode.unwrap_or(self.settings.default_mode);
    let stop_on_error = request.options.stop_on_error;

    tracing::info!(
      parent: &span,
      caller,
      models = request.models.len(),
      streaming = events.is_some(),
      ?mode,
      stop_on_error,
      "comparison started"
    );

    let credentials = self
      .resolve_credentials(caller, &request.models, &tokens.root)
      .instrument(span.clone())
      .await?;

    let mut slots: Vec<Option<ExecutionResult>> = vec![None; request.models.len()];
    let mut running: Vec<(usize, JoinHandle<ExecutionResult>)> = Vec::new();

    for (index, spec) in request.models.iter().enumerate() {
      let cancel = tokens.units[index].clone();
      if cancel.is_cancelled() {
        let provider = credentials
          .get(&spec.credential_ref)
          .map_or(UNKNOWN_PROVIDER, |c| c.provider_family.as_str());
        tracing::debug!(parent: &span, index, model = %spec.model_id, "model not admitted");
        let result =
          ExecutionResult::cancelled(provider, &spec.model_id, None, ExecutionMetrics::default());
        report(index, &result, stop_on_error, &tokens.root, events).await;
        slots[index] = Some(result);
        continue;
      }

      let unit = match self.prepare(index, spec, &request.messages, &credentials, cancel, events) {
        Ok(unit) => unit,
        Err(result) => {
          tracing::warn!(
            parent: &span,
            index,
            model = %spec.model_id,
            error = result.error_message.as_deref().unwrap_or_default(),
            "model could not be prepared"
          );
          report(index, &result, stop_on_error, &tokens.root, events).await;
          slots[index] = Some(result);
          continue;
        }
      };

      let (provider_id, model_id) = (unit.provider_id.clone(), unit.model_id.clone());
      let handle = tokio::spawn(
        run_unit(unit, stop_on_error, tokens.root.clone(), events.cloned()).instrument(span.clone()),
      );
      match mode {
        ExecutionMode::Parallel => running.push((index, handle)),
        ExecutionMode::Sequential => {
          let result = join_unit(index, &provider_id, &model_id, handle, stop_on_error, tokens, events).await;
          slots[index] = Some(result);
        }
      }
    }

    for (index, handle) in running {
      let spec = &request.models[index];
      let provider = credentials
        .get(&spec.credential_ref)
        .map_or(UNKNOWN_PROVIDER, |c| c.provider_family.as_str());
      let result = join_unit(index, provider, &spec.model_id, handle, stop_on_error, tokens, events).await;
      slots[index] = Some(result);
    }

    let results: Vec<ExecutionResult> = slots.into_iter().flatten().collect();
    let count = |status: ExecutionStatus| results.iter().filter(|r| r.status == status).count();
    tracing::info!(
      parent: &span,
      succeeded = count(ExecutionStatus::Success),
      failed = count(ExecutionStatus::Failed),
      cancelled = count(ExecutionStatus::Cancelled),
      "comparison finished"
    );
    Ok(results)
  }

  /// Resolves every distinct reference, retrying a failing store with linear
  /// backoff.
  async fn resolve_credentials(
    &self,
    caller: &str,
    models: &[ModelRequestSpec],
    cancel: &CancellationToken,
  ) -> Result<HashMap<String, ResolvedCredential>, CompareError> {
    let mut refs: Vec<String> = Vec::new();
    for spec in models {
      if !refs.contains(&spec.credential_ref) {
        refs.push(spec.credential_ref.clone());
      }
    }

    let mut attempt: u32 = 0;
    loop {
      attempt += 1;
      let outcome = tokio::select! {
        _ = cancel.cancelled() => return Err(CompareError::Cancelled),
        outcome = self.lookup.resolve(caller, &refs) => outcome,
      };
      match outcome {
        Ok(resolved) => return Ok(resolved),
        Err(source) if attempt > self.settings.lookup_retries => {
          return Err(CompareError::CredentialLookup {
            attempts: attempt,
            source,
          });
        }
        Err(err) => {
          tracing::warn!(attempt, error = %err, "credential lookup failed, retrying");
          let backoff = Duration::from_millis(self.settings.lookup_backoff_ms * u64::from(attempt));
          tokio::select! {
            _ = cancel.cancelled() => return Err(CompareError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
          }
        }
      }
    }
  }

  /// Builds a ready-to-run unit, or the failed result explaining why not.
  fn prepare(
    &self,
    index: usize,
    spec: &ModelRequestSpec,
    messages: &[ChatMessage],
    credentials: &HashMap<String, ResolvedCredential>,
    cancel: CancellationToken,
    events: Option<&mpsc::Sender<StreamFrame>>,
  ) -> Result<ExecutionUnit, ExecutionResult> {
    let model_id = spec.model_id.as_str();
    let Some(credential) = credentials.get(&spec.credential_ref) else {
      return Err(ExecutionResult::failed(
        UNKNOWN_PROVIDER,
        model_id,
        "credential not found or not authorized",
        Some(403),
        ExecutionMetrics::default(),
      ));
    };
    let provider_id = credential.provider_family.as_str();

    let no_secret = |detail: String| {
      ExecutionResult::failed(provider_id, model_id, detail, Some(403), ExecutionMetrics::default())
    };
    self
      .rotation
      .sync_pool(&spec.credential_ref, &credential.secrets, self.rotation_strategy)
      .map_err(|err| no_secret(format!("credential has no usable secret: {err}")))?;
    let secret = self
      .rotation
      .get_credential(&spec.credential_ref)
      .ok_or_else(|| no_secret("credential has no usable secret".to_string()))?;

    let resolved = self
      .factory
      .create_client(provider_id, &secret, credential.proxy_base_url.as_deref())
      .map_err(|err| {
        ExecutionResult::failed(
          provider_id,
          model_id,
          err.to_string(),
          err.status_code(),
          ExecutionMetrics::default(),
        )
      })?;

    let capabilities = self.resolver.resolve(provider_id, resolved.family, model_id);
    let options = capabilities.gate_options(&spec.generation_options);
    tracing::debug!(
      index,
      provider = provider_id,
      model = model_id,
      family = %resolved.family,
      base_url = %resolved.base_url,
      reasoning = capabilities.reasoning,
      "model prepared"
    );

    Ok(ExecutionUnit {
      index,
      provider_id: provider_id.to_string(),
      model_id: model_id.to_string(),
      client: resolved.client,
      request: ChatRequest {
        model: model_id.to_string(),
        messages: messages.to_vec(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        frequency_penalty: options.frequency_penalty,
        presence_penalty: options.presence_penalty,
        reasoning: capabilities.reasoning_options,
      },
      timeout: Duration::from_secs(self.settings.request_timeout_secs),
      cancel,
      events: events.cloned(),
    })
  }
}

/// Strategy for pools synced from credential lookups. Looked-up secrets carry
/// no weights, so a configured weighted strategy rotates round-robin.
fn pool_strategy(configured: RotationStrategy) -> RotationStrategy {
  match configured {
    RotationStrategy::Weighted => {
      tracing::warn!("rotation strategy \"weighted\" needs per-secret weights, using round-robin");
      RotationStrategy::RoundRobin
    }
    other => other,
  }
}

/// Body of a spawned unit task.
async fn run_unit(
  unit: ExecutionUnit,
  stop_on_error: bool,
  root: CancellationToken,
  events: Option<mpsc::Sender<StreamFrame>>,
) -> ExecutionResult {
  let index = unit.index;
  let result = unit.run().await;
  report(index, &result, stop_on_error, &root, events.as_ref()).await;
  result
}

/// Publishes a unit's terminal result and applies stop-on-error.
async fn report(
  index: usize,
  result: &ExecutionResult,
  stop_on_error: bool,
  root: &CancellationToken,
  events: Option<&mpsc::Sender<StreamFrame>>,
) {
  if stop_on_error && result.status == ExecutionStatus::Failed && !root.is_cancelled() {
    tracing::info!(index, model = %result.model_id, "stopping remaining models after failure");
    root.cancel();
  }
  if let Some(tx) = events {
    let _ = tx
      .send(StreamFrame::Event(StreamEvent::complete(index, result)))
      .await;
  }
}

/// Awaits a unit task. A task that died without a result counts as failed.
async fn join_unit(
  index: usize,
  provider_id: &str,
  model_id: &str,
  handle: JoinHandle<ExecutionResult>,
  stop_on_error: bool,
  tokens: &CallTokens,
  events: Option<&mpsc::Sender<StreamFrame>>,
) -> ExecutionResult {
  match handle.await {
    Ok(result) => result,
    Err(err) => {
      tracing::error!(index, model = model_id, error = %err, "model task aborted");
      let message = format!("execution task failed: {err}");
      if let Some(tx) = events {
        let _ = tx
          .send(StreamFrame::Event(StreamEvent::Error {
            error: message.clone(),
          }))
          .await;
      }
      let result = ExecutionResult::failed(
        provider_id,
        model_id,
        message,
        Some(500),
        ExecutionMetrics::default(),
      );
      report(index, &result, stop_on_error, &tokens.root, events).await;
      result
    }
  }
}

/// Streams the call-level error, then one terminal complete per model.
async fn fail_all(models: &[ModelRequestSpec], err: &CompareError, tx: &mpsc::Sender<StreamFrame>) {
  let cancelled = matches!(err, CompareError::Cancelled);
  if !cancelled {
    let _ = tx
      .send(StreamFrame::Event(StreamEvent::Error {
        error: err.to_string(),
      }))
      .await;
  }
  for (index, spec) in models.iter().enumerate() {
    let result = if cancelled {
      ExecutionResult::cancelled(UNKNOWN_PROVIDER, &spec.model_id, None, ExecutionMetrics::default())
    } else {
      ExecutionResult::failed(
        UNKNOWN_PROVIDER,
        &spec.model_id,
        err.to_string(),
        err.status_code(),
        ExecutionMetrics::default(),
      )
    };
    if tx
      .send(StreamFrame::Event(StreamEvent::complete(index, &result)))
      .await
      .is_err()
    {
      return;
    }
  }
}
