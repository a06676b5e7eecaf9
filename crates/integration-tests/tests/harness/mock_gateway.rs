//! Mock gateway and control plane for end-to-end tests
//!
//! One axum server answers the completion endpoint and the control-plane
//! routes. Each test scripts the completion reply.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DONE: &str = "data: [DONE]\n\n";

/// Scripted answer to `POST /v1/chat/completions`
#[derive(Debug, Clone)]
pub enum Reply {
    /// `text/event-stream` body, one chunk per string
    Stream(Vec<String>),
    /// Event stream that sends the given chunks and then never ends
    Stall(Vec<String>),
    /// `application/json` body
    Json(Value),
    /// Non-success status with a raw body
    Status(u16, String),
}

/// A completion request as the gateway saw it
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

struct MockState {
    reply: Mutex<Reply>,
    completions: Mutex<Vec<ReceivedRequest>>,
    evaluations: Mutex<Vec<Value>>,
    credits: Mutex<f64>,
}

/// Running mock server
pub struct MockGateway {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockGateway {
    /// Start the mock server with an initial completion reply
    pub async fn start(reply: Reply) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            reply: Mutex::new(reply),
            completions: Mutex::new(Vec::new()),
            evaluations: Mutex::new(Vec::new()),
            credits: Mutex::new(42.0),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/models", routing::get(handle_models))
            .route("/users/{id}", routing::get(handle_user))
            .route("/evaluations", routing::post(handle_evaluation))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL serving both the gateway and control-plane routes
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("valid URL")
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    pub fn set_credits(&self, credits: f64) {
        *self.state.credits.lock().unwrap() = credits;
    }

    /// Completion requests received so far
    pub fn completions(&self) -> Vec<ReceivedRequest> {
        self.state.completions.lock().unwrap().clone()
    }

    /// Wait until `count` preference uploads have arrived
    pub async fn wait_for_evaluations(&self, count: usize) -> Vec<Value> {
        for _ in 0..100 {
            let evaluations = self.state.evaluations.lock().unwrap().clone();
            if evaluations.len() >= count {
                return evaluations;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.state.evaluations.lock().unwrap().clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// `data:` frame carrying a content delta
pub fn delta(text: &str) -> String {
    format!("data: {}\n\n", json!({ "choices": [{ "delta": { "content": text } }] }))
}

/// `data:` frame carrying only usage
pub fn usage(prompt_tokens: u64, completion_tokens: u64) -> String {
    format!(
        "data: {}\n\n",
        json!({
            "choices": [],
            "usage": { "prompt_tokens": prompt_tokens, "completion_tokens": completion_tokens }
        })
    )
}

// -- Handlers --

async fn handle_chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state
        .completions
        .lock()
        .unwrap()
        .push(ReceivedRequest { authorization, body });

    let reply = state.reply.lock().unwrap().clone();
    match reply {
        Reply::Stream(chunks) => event_stream(chunk_stream(chunks)),
        Reply::Stall(chunks) => event_stream(chunk_stream(chunks).chain(stream::pending())),
        Reply::Json(value) => Json(value).into_response(),
        Reply::Status(status, body) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        }
    }
}

fn chunk_stream(chunks: Vec<String>) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream::iter(chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))))
}

fn event_stream(chunks: impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn handle_models() -> Json<Value> {
    Json(json!([
        {
            "id": 1,
            "name": "GPT-4o",
            "slug": "gpt-4o",
            "company": { "name": "OpenAI" },
            "mappings": [{ "input_token_cost": 2.5, "output_token_cost": 10.0 }]
        },
        {
            "id": 2,
            "name": "Llama 3 8B",
            "slug": "llama-3-8b",
            "company": { "name": "Meta" },
            "mappings": [{ "input_token_cost": 0.05, "output_token_cost": 0.08 }]
        },
        {
            "id": 3,
            "name": "Unrouted",
            "slug": "unrouted",
            "mappings": []
        }
    ]))
}

async fn handle_user(State(state): State<Arc<MockState>>, Path(id): Path<u64>) -> Json<Value> {
    let credits = *state.credits.lock().unwrap();
    Json(json!({ "id": id, "email": "dev@example.com", "credits": credits }))
}

async fn handle_evaluation(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> impl IntoResponse {
    state.evaluations.lock().unwrap().push(body.clone());
    (StatusCode::CREATED, Json(body))
}
