//! Helpers shared by the integration tests.
#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bag-of-words vector: each lowercase word lands in one of 16 buckets.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; 16];
    for word in text.to_lowercase().split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.is_empty() {
            continue;
        }
        let bucket = word
            .bytes()
            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % vector.len();
        vector[bucket] += 1.0;
    }
    vector
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Fake OpenAI-style embedding provider.
#[derive(Clone, Default)]
pub struct FakeEmbeddings {
    pub calls: Arc<AtomicUsize>,
    /// Number of leading calls answered with 429.
    pub rate_limited: usize,
    pub last_headers: Arc<Mutex<Option<HeaderMap>>>,
}

impl FakeEmbeddings {
    pub fn rate_limited(times: usize) -> Self {
        Self {
            rate_limited: times,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn serve(self) -> String {
        let app = Router::new()
            .route("/v1/embeddings", post(fake_embeddings))
            .with_state(self);
        format!("{}/v1", spawn_server(app).await)
    }
}

async fn fake_embeddings(
    State(fake): State<FakeEmbeddings>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let call = fake.calls.fetch_add(1, Ordering::SeqCst);
    *fake.last_headers.lock() = Some(headers);
    if call < fake.rate_limited {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }
    let input = body["input"].as_str().unwrap_or_default();
    Json(json!({ "data": [{ "embedding": embed_text(input), "index": 0 }] })).into_response()
}

/// Serve a fixed chat-completions reply whose message content is `content`.
pub async fn fake_groq(content: &'static str, status: StatusCode) -> String {
    let app = Router::new().route(
        "/openai/v1/chat/completions",
        post(move |headers: HeaderMap| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "Bearer gsk_test");
            if !authorized {
                return (StatusCode::UNAUTHORIZED, "missing key").into_response();
            }
            if !status.is_success() {
                return (status, "upstream error").into_response();
            }
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            }))
            .into_response()
        }),
    );
    format!("{}/openai/v1", spawn_server(app).await)
}
