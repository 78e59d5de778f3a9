//! Model clients against an in-process HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};

use vertex_core::config::VertexConfig;
use vertex_core::error::{ModelError, VertexError};
use vertex_core::message::{ChatMessage, UsageSummary};
use vertex_core::model::{CallOptions, ChatModel};
use vertex_llm::auth::{GoogleCredentials, GoogleTokenProvider, StaticTokenProvider, TokenProvider};
use vertex_llm::claude::ClaudeChatModel;
use vertex_llm::gemini::GeminiChatModel;
use vertex_llm::openai::OpenAIChatModel;
use vertex_llm::sse::sse_data_stream;
use vertex_llm::stream::{Termination, drain_stream};

const CHAT_PATH: &str = "/v1/projects/test-project/locations/us-east5/endpoints/openapi/chat/completions";
const LLAMA: &str = "meta/llama-4-maverick-17b-128e-instruct-maas";

#[derive(Clone, Default)]
struct Recorded {
    body: Arc<Mutex<Option<Value>>>,
    path: Arc<Mutex<Option<String>>>,
    authorization: Arc<Mutex<Option<String>>>,
}

impl Recorded {
    fn record(&self, uri: &Uri, headers: &HeaderMap, body: Value) {
        *self.path.lock().unwrap() = Some(uri.path().to_string());
        *self.authorization.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.body.lock().unwrap() = Some(body);
    }

    fn body(&self) -> Value {
        self.body.lock().unwrap().clone().expect("no request recorded")
    }

    fn path(&self) -> String {
        self.path.lock().unwrap().clone().expect("no request recorded")
    }

    fn authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }
}

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn test_config(base: &str) -> VertexConfig {
    VertexConfig::new("test-project")
        .with_location("us-east5")
        .with_base_url(format!("{base}/v1"))
}

fn static_tokens() -> Arc<dyn TokenProvider> {
    Arc::new(StaticTokenProvider::new("test-token"))
}

fn sse_response(chunks: Vec<&'static str>) -> Response {
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
    );
    axum::http::Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Serves `chunks` as the SSE body for every chat request.
async fn spawn_chat_server(chunks: Vec<&'static str>) -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            CHAT_PATH,
            post(
                move |State(rec): State<Recorded>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
                    let chunks = chunks.clone();
                    async move {
                        rec.record(&uri, &headers, body);
                        sse_response(chunks)
                    }
                },
            ),
        )
        .with_state(recorded.clone());
    (spawn_server(app).await, recorded)
}

// ---------------------------------------------------------------------------
// Streaming chat completions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_renders_tokens_and_usage() {
    let (base, recorded) = spawn_chat_server(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
        "data: [DONE]\n\n",
    ])
    .await;

    let model = OpenAIChatModel::new(&test_config(&base), static_tokens(), LLAMA).unwrap();
    let stream = model
        .stream(&[ChatMessage::user("Summer travel plan to Paris")], &CallOptions::default())
        .await
        .unwrap();

    let mut out = Vec::new();
    let mut err = Vec::new();
    let response = drain_stream(stream, &mut out, &mut err).await.unwrap();

    assert_eq!(response.text, "Hi there");
    assert_eq!(response.usage, Some(UsageSummary::new(5, 2, 7)));
    assert_eq!(response.termination, Termination::Done);
    assert_eq!(String::from_utf8(out).unwrap(), "Hi there");
    assert!(err.is_empty());

    assert_eq!(recorded.path(), CHAT_PATH);
    assert_eq!(recorded.authorization().as_deref(), Some("Bearer test-token"));
    assert_eq!(
        recorded.body(),
        json!({
            "model": LLAMA,
            "stream": true,
            "messages": [{"role": "user", "content": "Summer travel plan to Paris"}]
        })
    );
}

#[tokio::test]
async fn stream_end_of_body_without_done() {
    let (base, _recorded) = spawn_chat_server(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"파리 \"}}]}\r\n\r\n",
        "data: not-json\r\n\r\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"여행\"}}]}",
    ])
    .await;

    let model = OpenAIChatModel::new(&test_config(&base), static_tokens(), LLAMA).unwrap();
    let stream = model
        .stream(&[ChatMessage::user("hi")], &CallOptions::default())
        .await
        .unwrap();

    let mut out = Vec::new();
    let mut err = Vec::new();
    let response = drain_stream(stream, &mut out, &mut err).await.unwrap();

    assert_eq!(response.text, "파리 여행");
    assert_eq!(response.termination, Termination::EndOfBody);
    assert_eq!(response.diagnostics.len(), 1);
    assert!(String::from_utf8(err).unwrap().contains("not-json"));
}

#[tokio::test]
async fn raw_data_lines_from_response() {
    let (base, _recorded) = spawn_chat_server(vec![
        ": keep-alive\n\ndata: {\"a\":1}\n\n",
        "data: [DONE]\n\n",
    ])
    .await;

    let model = OpenAIChatModel::new(&test_config(&base), static_tokens(), LLAMA).unwrap();
    let request = model.build_request(&[ChatMessage::user("hi")], &CallOptions::default());
    let response = model.send_streaming(&request).await.unwrap();

    let lines: Vec<String> = sse_data_stream(response)
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(lines, vec![r#"{"a":1}"#, "[DONE]"]);
}

#[tokio::test]
async fn non_success_status_is_reported_before_streaming() {
    let error_body = r#"{"error":{"code":403,"message":"Permission denied on resource project test-project.","status":"PERMISSION_DENIED"}}"#;
    let app = Router::new().route(
        CHAT_PATH,
        post(move || async move { (StatusCode::FORBIDDEN, error_body) }),
    );
    let base = spawn_server(app).await;

    let model = OpenAIChatModel::new(&test_config(&base), static_tokens(), LLAMA).unwrap();
    let result = model
        .stream(&[ChatMessage::user("hi")], &CallOptions::default())
        .await;

    match result {
        Err(VertexError::Model(ModelError::Status { status, body })) => {
            assert_eq!(status, 403);
            assert_eq!(body, error_body);
        }
        Err(other) => panic!("expected status error, got {other:?}"),
        Ok(_) => panic!("expected status error, got a stream"),
    }
}

#[tokio::test]
async fn body_error_mid_stream_is_transport_error() {
    let app = Router::new().route(
        CHAT_PATH,
        post(|| async {
            // The error must come after the headers have gone out.
            let stream = async_stream::stream! {
                yield Ok::<_, std::io::Error>(Bytes::from_static(
                    b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n",
                ));
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                yield Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "upstream went away"));
            };
            axum::http::Response::builder()
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(stream))
                .unwrap()
        }),
    );
    let base = spawn_server(app).await;

    let model = OpenAIChatModel::new(&test_config(&base), static_tokens(), LLAMA).unwrap();
    let stream = model
        .stream(&[ChatMessage::user("hi")], &CallOptions::default())
        .await
        .unwrap();

    let mut out = Vec::new();
    let result = drain_stream(stream, &mut out, &mut std::io::sink()).await;

    assert!(matches!(result, Err(VertexError::Model(ModelError::Transport(_)))));
    assert_eq!(String::from_utf8(out).unwrap(), "par");
}

#[tokio::test]
async fn openai_generate_non_streaming() {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            CHAT_PATH,
            post(
                |State(rec): State<Recorded>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>| async move {
                    rec.record(&uri, &headers, body);
                    Json(json!({
                        "choices": [{"index": 0, "message": {"role": "assistant", "content": "Bonjour"}, "finish_reason": "stop"}],
                        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
                    }))
                },
            ),
        )
        .with_state(recorded.clone());
    let base = spawn_server(app).await;

    let model = OpenAIChatModel::new(&test_config(&base), static_tokens(), LLAMA).unwrap();
    let result = model
        .generate(&[ChatMessage::user("hi")], &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(result.text(), "Bonjour");
    assert_eq!(result.finish_reason.as_deref(), Some("stop"));
    assert_eq!(result.usage, Some(UsageSummary::new(3, 1, 4)));
    assert!(recorded.body().get("stream").is_none());
}

// ---------------------------------------------------------------------------
// Publisher models
// ---------------------------------------------------------------------------

async fn spawn_publisher_server(reply: Value) -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .fallback(
            move |State(rec): State<Recorded>, uri: Uri, headers: HeaderMap, Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    rec.record(&uri, &headers, body);
                    Json(reply).into_response()
                }
            },
        )
        .with_state(recorded.clone());
    (spawn_server(app).await, recorded)
}

#[tokio::test]
async fn claude_raw_predict() {
    let (base, recorded) = spawn_publisher_server(json!({
        "id": "msg_vrtx_01",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": "Once upon a time"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 17, "output_tokens": 4}
    }))
    .await;

    let config = test_config(&base).with_location("us-central1");
    let model = ClaudeChatModel::new(&config, static_tokens(), "claude-3-haiku@20240307").unwrap();
    let result = model
        .generate(
            &[ChatMessage::user("Tell me a story about building the best SDK!")],
            &CallOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.text(), "Once upon a time");
    assert_eq!(result.usage, Some(UsageSummary::new(17, 4, 21)));
    assert_eq!(result.finish_reason.as_deref(), Some("end_turn"));
    assert_eq!(
        recorded.path(),
        "/v1/projects/test-project/locations/us-central1/publishers/anthropic/models/claude-3-haiku@20240307:rawPredict"
    );
    let body = recorded.body();
    assert_eq!(body["anthropic_version"], "vertex-2023-10-16");
    assert_eq!(body["max_tokens"], 1024);
    assert!(body.get("model").is_none());
}

#[tokio::test]
async fn gemini_generate_content() {
    let (base, recorded) = spawn_publisher_server(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": "RAG retrieves; "}, {"text": "agents act."}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 5, "totalTokenCount": 14}
    }))
    .await;

    let config = test_config(&base).with_location("us-central1");
    let model = GeminiChatModel::new(&config, static_tokens(), "gemini-2.0-flash-lite").unwrap();
    let result = model
        .generate(&[ChatMessage::user("AI agent와 RAG 차이 설명해 줘")], &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(result.text(), "RAG retrieves; agents act.");
    assert_eq!(result.usage, Some(UsageSummary::new(9, 5, 14)));
    assert_eq!(result.finish_reason.as_deref(), Some("STOP"));
    assert!(recorded.path().ends_with("/publishers/google/models/gemini-2.0-flash-lite:generateContent"));
    assert_eq!(recorded.body()["contents"][0]["role"], "user");
}

// ---------------------------------------------------------------------------
// Token exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authorized_user_token_is_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/token",
            post(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer"}))
            }),
        )
        .with_state(hits.clone());
    let base = spawn_server(app).await;

    let creds = GoogleCredentials::from_json(
        r#"{"type":"authorized_user","client_id":"cid","client_secret":"secret","refresh_token":"1//r"}"#,
    )
    .unwrap();
    let provider = GoogleTokenProvider::new(creds).with_token_uri(format!("{base}/token"));

    assert_eq!(provider.access_token().await.unwrap(), "ya29.fresh");
    assert_eq!(provider.access_token().await.unwrap(), "ya29.fresh");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn token_exchange_failure_is_auth_error() {
    let app = Router::new().route(
        "/token",
        post(|| async { (StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#) }),
    );
    let base = spawn_server(app).await;

    let creds = GoogleCredentials::from_json(
        r#"{"type":"authorized_user","client_id":"cid","client_secret":"secret","refresh_token":"revoked"}"#,
    )
    .unwrap();
    let provider = GoogleTokenProvider::new(creds).with_token_uri(format!("{base}/token"));

    let err = provider.access_token().await.unwrap_err();
    assert!(matches!(err, VertexError::Auth(vertex_core::error::AuthError::TokenExchange(msg)) if msg.contains("invalid_grant")));
}
