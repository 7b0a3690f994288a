use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use arena_config::Config;
use arena_core::ComparisonOrchestrator;
use arena_core::credentials::{CredentialRotationManager, ResolvedCredential, StaticCredentialLookup};
use arena_core::model::{CapabilityResolver, EndpointRegistry, ProviderClientFactory};
use arena_protocol::{
  ChatMessage, ComparisonRequest, ExecutionStatus, GenerationOptions, ModelRequestSpec,
  StreamEvent, StreamFrame,
};

const OPENAI_SSE: &str = concat!(
  "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hel\"}\n\n",
  "data: {\"type\":\"response.output_text.delta\",\"delta\":\"lo\"}\n\n",
  "data: {\"type\":\"response.completed\",\"response\":{\"usage\":{\"input_tokens\":5,\"output_tokens\":2,\"total_tokens\":7}}}\n\n",
);

const ANTHROPIC_SSE: &str = concat!(
  "event: message_start\n",
  "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":9,\"output_tokens\":1}}}\n\n",
  "event: content_block_delta\n",
  "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"Let me think\"}}\n\n",
  "event: content_block_delta\n",
  "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"Claude\"}}\n\n",
  "event: message_delta\n",
  "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":12}}\n\n",
  "event: message_stop\n",
  "data: {\"type\":\"message_stop\"}\n\n",
);

const GEMINI_SSE: &str = concat!(
  "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"weighing\",\"thought\":true}]}}]}\n\n",
  "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Gemini\"}]}}],\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":3,\"totalTokenCount\":11}}\n\n",
);

const COMPLETIONS_SSE: &str = concat!(
  "data: {\"choices\":[{\"delta\":{\"content\":\"Deep\"}}]}\n\n",
  "data: {\"choices\":[{\"delta\":{\"content\":\"Seek\"},\"finish_reason\":\"stop\"}]}\n\n",
  "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}\n\n",
  "data: [DONE]\n\n",
);

fn sse(body: &str) -> ResponseTemplate {
  ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn proxied(provider: &str, secret: &str, base_url: String) -> ResolvedCredential {
  ResolvedCredential {
    provider_family: provider.to_string(),
    secrets: vec![secret.to_string()],
    proxy_base_url: Some(base_url),
  }
}

fn orchestrator(lookup: StaticCredentialLookup) -> ComparisonOrchestrator {
  let config = Config::default();
  let registry = Arc::new(EndpointRegistry::builtin());
  let resolver = CapabilityResolver::new(&config.reasoning).with_catalog(registry.clone());
  ComparisonOrchestrator::new(
    Arc::new(ProviderClientFactory::new(registry, &config)),
    Arc::new(resolver),
    Arc::new(CredentialRotationManager::new()),
    Arc::new(lookup),
    &config,
  )
}

fn entry(credential_ref: &str, model: &str) -> ModelRequestSpec {
  ModelRequestSpec::new(credential_ref, model).with_options(GenerationOptions {
    temperature: Some(0.5),
    max_tokens: Some(300),
    ..Default::default()
  })
}

fn joined(frames: &[StreamFrame], index: usize, reasoning: bool) -> String {
  frames
    .iter()
    .filter_map(|frame| match frame {
      StreamFrame::Event(StreamEvent::Chunk { index: i, chunk, .. }) if !reasoning && *i == index => {
        Some(chunk.as_str())
      }
      StreamFrame::Event(StreamEvent::Reasoning { index: i, chunk, .. }) if reasoning && *i == index => {
        Some(chunk.as_str())
      }
      _ => None,
    })
    .collect()
}

async fn body_for(server: &MockServer, request_path: &str) -> Value {
  let requests = server.received_requests().await.unwrap_or_default();
  let request = requests
    .iter()
    .find(|r| r.url.path() == request_path)
    .unwrap_or_else(|| panic!("no request to {request_path}"));
  request.body_json::<Value>().expect("json body")
}

#[tokio::test]
async fn streams_every_wire_family_through_one_call() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/responses"))
    .and(header("authorization", "Bearer sk-openai"))
    .respond_with(sse(OPENAI_SSE))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/v1/messages"))
    .and(header("x-api-key", "sk-ant"))
    .respond_with(sse(ANTHROPIC_SSE))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/v1/models/gemini-2.5-flash:streamGenerateContent"))
    .and(header("x-goog-api-key", "sk-goog"))
    .respond_with(sse(GEMINI_SSE))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/v1/chat/completions"))
    .respond_with(sse(COMPLETIONS_SSE))
    .mount(&server)
    .await;

  let uri = server.uri();
  let lookup = StaticCredentialLookup::new()
    .with("alice", "oa", proxied("openai", "sk-openai", uri.clone()))
    .with("alice", "an", proxied("anthropic", "sk-ant", uri.clone()))
    .with("alice", "gg", proxied("google", "sk-goog", uri.clone()))
    .with("alice", "ds", proxied("deepseek", "sk-deep", uri.clone()));

  let mut request = ComparisonRequest::new(
    vec![
      entry("oa", "gpt-4o"),
      entry("an", "claude-sonnet-4-20250514"),
      entry("gg", "gemini-2.5-flash"),
      entry("ds", "deepseek-chat"),
    ],
    vec![ChatMessage::system("be brief"), ChatMessage::user("say hello")],
  );
  request.options.streaming = true;

  let frames = orchestrator(lookup)
    .compare_stream("alice", request)
    .collect_frames()
    .await;

  assert_eq!(frames.last(), Some(&StreamFrame::Done));
  let mut statuses: Vec<(usize, ExecutionStatus)> = frames
    .iter()
    .filter_map(|frame| match frame {
      StreamFrame::Event(StreamEvent::Complete { index, status, .. }) => Some((*index, *status)),
      _ => None,
    })
    .collect();
  statuses.sort_by_key(|(index, _)| *index);
  assert_eq!(
    statuses,
    (0..4).map(|i| (i, ExecutionStatus::Success)).collect::<Vec<_>>()
  );

  assert_eq!(joined(&frames, 0, false), "Hello");
  assert_eq!(joined(&frames, 1, false), "Claude");
  assert_eq!(joined(&frames, 1, true), "Let me think");
  assert_eq!(joined(&frames, 2, false), "Gemini");
  assert_eq!(joined(&frames, 2, true), "weighing");
  assert_eq!(joined(&frames, 3, false), "DeepSeek");

  // Non-reasoning models keep the caller's temperature.
  let openai = body_for(&server, "/v1/responses").await;
  assert_eq!(openai["temperature"], serde_json::json!(0.5));
  assert_eq!(openai["instructions"], "be brief");
  assert!(openai.get("reasoning").is_none());

  // Reasoning models drop it and get their family's reasoning parameters.
  let anthropic = body_for(&server, "/v1/messages").await;
  assert!(anthropic.get("temperature").is_none());
  assert_eq!(anthropic["thinking"]["type"], "enabled");
  assert_eq!(anthropic["thinking"]["budget_tokens"], 12000);

  let gemini = body_for(&server, "/v1/models/gemini-2.5-flash:streamGenerateContent").await;
  assert!(gemini["generationConfig"].get("temperature").is_none());
  assert_eq!(gemini["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
  assert_eq!(gemini["generationConfig"]["maxOutputTokens"], 300);

  let deepseek = body_for(&server, "/v1/chat/completions").await;
  assert_eq!(deepseek["model"], "deepseek-chat");
  assert_eq!(deepseek["stream"], true);
}

#[tokio::test]
async fn upstream_error_is_isolated_in_aggregate_mode() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/responses"))
    .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
      "output": [{"type": "message", "content": [{"type": "output_text", "text": "fine"}]}],
      "usage": {"input_tokens": 3, "output_tokens": 1, "total_tokens": 4}
    })))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/v1/chat/completions"))
    .respond_with(
      ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": {"message": "overloaded"}})),
    )
    .mount(&server)
    .await;

  let uri = server.uri();
  let lookup = StaticCredentialLookup::new()
    .with("alice", "oa", proxied("openai", "sk-openai", uri.clone()))
    .with("alice", "ds", proxied("deepseek", "sk-deep", uri));

  let response = orchestrator(lookup)
    .compare(
      "alice",
      ComparisonRequest::new(
        vec![entry("ds", "deepseek-chat"), entry("oa", "gpt-4o")],
        vec![ChatMessage::user("hi")],
      ),
    )
    .await
    .expect("compare");

  let failed = &response.results[0];
  assert_eq!(failed.status, ExecutionStatus::Failed);
  assert_eq!(failed.provider_id, "deepseek");
  assert_eq!(failed.status_code, Some(500));
  assert!(failed.error_message.as_deref().unwrap_or_default().contains("overloaded"));

  let ok = &response.results[1];
  assert_eq!(ok.status, ExecutionStatus::Success);
  assert_eq!(ok.text.as_deref(), Some("fine"));
  assert_eq!(ok.usage.map(|u| u.total_tokens), Some(4));
}

#[tokio::test]
async fn unknown_provider_with_url_speaks_chat_completions() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/gateway/v2/chat/completions"))
    .respond_with(sse(COMPLETIONS_SSE))
    .mount(&server)
    .await;
  Mock::given(method("POST"))
    .and(path("/raw/chat/completions"))
    .respond_with(sse(COMPLETIONS_SSE))
    .mount(&server)
    .await;

  let uri = server.uri();
  let lookup = StaticCredentialLookup::new()
    .with("alice", "gw", proxied("acme-llm", "sk-acme", format!("{uri}/gateway/v2/")))
    .with("alice", "raw", proxied("custom", "sk-raw", format!("{uri}/raw#")));

  let mut request = ComparisonRequest::new(
    vec![entry("gw", "acme-large"), entry("raw", "local-model")],
    vec![ChatMessage::user("hi")],
  );
  request.options.streaming = true;
  let frames = orchestrator(lookup)
    .compare_stream("alice", request)
    .collect_frames()
    .await;

  assert_eq!(joined(&frames, 0, false), "DeepSeek");
  assert_eq!(joined(&frames, 1, false), "DeepSeek");
}

#[tokio::test]
async fn upstream_rejection_in_stream_becomes_failed_complete() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/v1/messages"))
    .respond_with(
      ResponseTemplate::new(401)
        .set_body_json(serde_json::json!({"type": "error", "error": {"message": "invalid x-api-key"}})),
    )
    .mount(&server)
    .await;

  let lookup = StaticCredentialLookup::new().with(
    "alice",
    "an",
    proxied("anthropic", "sk-bad", server.uri()),
  );
  let mut request = ComparisonRequest::new(
    vec![entry("an", "claude-3-5-haiku-20241022")],
    vec![ChatMessage::user("hi")],
  );
  request.options.streaming = true;
  let frames = orchestrator(lookup)
    .compare_stream("alice", request)
    .collect_frames()
    .await;

  match &frames[..] {
    [StreamFrame::Event(StreamEvent::Complete { status, status_code, error, .. }), StreamFrame::Done] => {
      assert_eq!(*status, ExecutionStatus::Failed);
      assert_eq!(*status_code, Some(401));
      assert!(error.as_deref().unwrap_or_default().contains("invalid x-api-key"));
    }
    other => panic!("unexpected frames: {other:?}"),
  }
}
