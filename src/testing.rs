//! In-process stand-in for the Speaches model registry, for tests.

use crate::config::Config;
use crate::model::ModelId;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Inner {
    registry: Vec<String>,
    posted: Vec<String>,
    failures: HashMap<String, u32>,
    api_key: Option<String>,
    delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeState {
    inner: Arc<Mutex<Inner>>,
}

impl FakeState {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn require_api_key(&self, key: &str) {
        self.lock().api_key = Some(key.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// The next `times` POSTs for `model` answer 503.
    pub fn fail_next(&self, model: &str, times: u32) {
        self.lock().failures.insert(model.to_string(), times);
    }

    pub fn preload(&self, model: &str) {
        self.lock().registry.push(model.to_string());
    }

    pub fn posted(&self) -> Vec<String> {
        self.lock().posted.clone()
    }

    pub fn registry(&self) -> Vec<String> {
        self.lock().registry.clone()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(key) = self.lock().api_key.clone() else {
            return true;
        };
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", key))
            .unwrap_or(false)
    }
}

async fn download_model(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path((org, name)): Path<(String, String)>,
) -> Response {
    if !state.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
    }

    let delay = state.lock().delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let id = format!("{}/{}", org, name);
    let mut inner = state.lock();
    inner.posted.push(id.clone());

    if let Some(left) = inner.failures.get_mut(&id) {
        if *left > 0 {
            *left -= 1;
            return (StatusCode::SERVICE_UNAVAILABLE, "Hub unavailable").into_response();
        }
    }

    if org == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": format!("Model '{}' not found", id) })),
        )
            .into_response();
    }

    if inner.registry.contains(&id) {
        (StatusCode::OK, "Model already exists").into_response()
    } else {
        inner.registry.push(id);
        (StatusCode::CREATED, "Model downloaded").into_response()
    }
}

async fn list_models(State(state): State<FakeState>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
    }

    let data: Vec<_> = state
        .registry()
        .into_iter()
        .map(|id| {
            let owner = id.split('/').next().unwrap_or_default().to_string();
            serde_json::json!({ "id": id, "object": "model", "owned_by": owner, "created": 0 })
        })
        .collect();

    Json(serde_json::json!({ "object": "list", "data": data })).into_response()
}

async fn health() -> &'static str {
    "OK"
}

pub struct FakeServer {
    pub base_url: String,
    pub state: FakeState,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state = FakeState::default();
        let app = Router::new()
            .route("/health", get(health))
            .route("/v1/models", get(list_models))
            .route("/v1/models/{org}/{name}", post(download_model))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A URL nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn test_config(base_url: &str) -> Config {
    Config {
        base_url: reqwest::Url::parse(base_url).unwrap(),
        api_key: None,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
        retries: 0,
        retry_backoff: Duration::from_millis(1),
        models: ModelId::defaults(),
    }
}
