//! A local stand-in for the forecasting backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};

/// What the start endpoint answers.
#[derive(Clone)]
pub enum StartReply {
    /// 200 with the given body after the delay.
    Ok { body: Value, delay: Duration },
    /// Status with a JSON body.
    Status(StatusCode, Value),
    /// Status with a plain-text body.
    Text(StatusCode, &'static str),
}

pub struct FakeBackend {
    pub progress: Mutex<VecDeque<Value>>,
    last_progress: Mutex<Value>,
    pub start_reply: Mutex<StartReply>,
    pub forms: Mutex<Vec<Vec<(String, String)>>>,
    pub cookies: Mutex<Vec<String>>,
    pub progress_hits: Mutex<u32>,
}

impl FakeBackend {
    pub fn new(progress: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            progress: Mutex::new(progress.into()),
            last_progress: Mutex::new(json!({})),
            start_reply: Mutex::new(StartReply::Ok {
                body: json!({"success": true}),
                delay: Duration::ZERO,
            }),
            forms: Mutex::new(Vec::new()),
            cookies: Mutex::new(Vec::new()),
            progress_hits: Mutex::new(0),
        })
    }

    pub fn reply_to_start(&self, reply: StartReply) {
        *self.start_reply.lock().unwrap() = reply;
    }

    fn record_cookie(&self, headers: &HeaderMap) {
        if let Some(c) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
            self.cookies.lock().unwrap().push(c.to_string());
        }
    }
}

async fn start(
    State(backend): State<Arc<FakeBackend>>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    backend.record_cookie(&headers);
    backend.forms.lock().unwrap().push(form);
    let reply = backend.start_reply.lock().unwrap().clone();
    match reply {
        StartReply::Ok { body, delay } => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
        StartReply::Status(status, body) => (status, Json(body)).into_response(),
        StartReply::Text(status, body) => (status, body).into_response(),
    }
}

async fn progress(State(backend): State<Arc<FakeBackend>>, headers: HeaderMap) -> Json<Value> {
    backend.record_cookie(&headers);
    *backend.progress_hits.lock().unwrap() += 1;
    let next = backend.progress.lock().unwrap().pop_front();
    let mut last = backend.last_progress.lock().unwrap();
    if let Some(snap) = next {
        *last = snap;
    }
    Json(last.clone())
}

async fn files() -> Json<Value> {
    Json(json!({
        "files": [
            {"name": "weather.csv", "rows": 1095, "columns": ["fecha", "temp", "humedad"], "size": 52428, "modified": "2026-09-30 08:00"},
            {"name": "short.csv", "rows": 90, "columns": ["fecha", "temp"], "size": 2048}
        ]
    }))
}

async fn models() -> Json<Value> {
    Json(json!({"modelos": ["sarima", "sarimax", "var", "lstm"]}))
}

async fn trained() -> Json<Value> {
    Json(json!({"available": ["sarima", "var"]}))
}

pub fn router(backend: Arc<FakeBackend>) -> Router {
    Router::new()
        .route("/entrenamiento/proceso", post(start))
        .route("/prediccion/proceso", post(start))
        .route("/api/progreso_entrenamiento", get(progress))
        .route("/api/progreso_prediccion", get(progress))
        .route("/api/archivos_datos", get(files))
        .route("/api/modelos_disponibles", get(models))
        .route("/api/check_trained_models", get(trained))
        .with_state(backend)
}

/// Serves `backend` on an ephemeral port and returns its base URL.
pub async fn serve(backend: Arc<FakeBackend>) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(backend)).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn snapshot(step: u32, total: u32, messages: &[&str], complete: bool) -> Value {
    let step_messages: Vec<Value> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| json!({"timestamp": format!("10:00:{i:02}"), "message": m}))
        .collect();
    json!({
        "current_step": step,
        "total_steps": total,
        "current_substep": 0,
        "total_substeps": 0,
        "current_message": messages.last().copied().unwrap_or(""),
        "step_messages": step_messages,
        "is_complete": complete,
    })
}
