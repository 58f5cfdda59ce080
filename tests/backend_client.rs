//! `BackendClient` against a local HTTP backend.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use forecast_console_lib::api::{ApiError, BackendClient, JobBackend};
use forecast_console_lib::job::JobKind;
use forecast_console_lib::params::{ModelKind, PredictionParams, TrainingParams};
use serde_json::json;

use common::{serve, snapshot, FakeBackend, StartReply};

fn client(base: &str) -> BackendClient {
    BackendClient::new(base, Some("session=abc123"), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn empty_progress_decodes_as_not_started() {
    let backend = FakeBackend::new(vec![]);
    let base = serve(backend.clone()).await;

    let snap = client(&base).fetch_progress(JobKind::Training).await.unwrap();

    assert!(!snap.is_complete);
    assert_eq!(snap.percentage(), 0);
    assert!(snap.step_messages.is_empty());
}

#[tokio::test]
async fn progress_is_read_from_the_kind_endpoint() {
    let backend = FakeBackend::new(vec![snapshot(3, 6, &["a", "b", "c"], false)]);
    let base = serve(backend.clone()).await;

    let snap = client(&base).fetch_progress(JobKind::Prediction).await.unwrap();

    assert_eq!(snap.current_step, 3);
    assert_eq!(snap.percentage(), 50);
    assert_eq!(snap.step_messages.len(), 3);
    assert_eq!(*backend.progress_hits.lock().unwrap(), 1);
    assert_eq!(backend.cookies.lock().unwrap().as_slice(), ["session=abc123"]);
}

#[tokio::test]
async fn training_start_posts_the_form() {
    let backend = FakeBackend::new(vec![]);
    let base = serve(backend.clone()).await;
    let params = TrainingParams {
        data_file: "weather.csv".into(),
        models: vec![ModelKind::Sarima, ModelKind::Lstm],
        ..Default::default()
    };

    let resp = client(&base)
        .start_job(JobKind::Training, &params.to_form())
        .await
        .unwrap();

    assert!(resp.success);
    let forms = backend.forms.lock().unwrap();
    let form = &forms[0];
    let models: Vec<&str> = form
        .iter()
        .filter(|(k, _)| k == "models")
        .map(|(_, v)| v.as_str())
        .collect();
    assert_eq!(models, vec!["sarima", "lstm"]);
    assert!(form.contains(&("data_file".to_string(), "weather.csv".to_string())));
    assert!(form.contains(&("sarima_s".to_string(), "30".to_string())));
}

#[tokio::test]
async fn prediction_start_returns_redirect() {
    let backend = FakeBackend::new(vec![]);
    backend.reply_to_start(StartReply::Ok {
        body: json!({"success": true, "redirect_url": "/prediccion/resultados"}),
        delay: Duration::ZERO,
    });
    let base = serve(backend.clone()).await;

    let resp = client(&base)
        .start_job(JobKind::Prediction, &PredictionParams { horizon_days: 400 }.to_form())
        .await
        .unwrap();

    assert_eq!(resp.redirect_url.as_deref(), Some("/prediccion/resultados"));
    let forms = backend.forms.lock().unwrap();
    assert_eq!(forms[0], vec![("horizon_days".to_string(), "365".to_string())]);
}

#[tokio::test]
async fn rejection_carries_server_message() {
    let backend = FakeBackend::new(vec![]);
    backend.reply_to_start(StartReply::Status(
        StatusCode::BAD_REQUEST,
        json!({"error": "Selecciona al menos un tipo de modelo"}),
    ));
    let base = serve(backend).await;

    let err = client(&base)
        .start_job(JobKind::Training, &TrainingParams::default().to_form())
        .await
        .unwrap_err();

    match err {
        ApiError::Rejected(msg) => assert_eq!(msg, "Selecciona al menos un tipo de modelo"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn unsuccessful_body_is_a_rejection() {
    let backend = FakeBackend::new(vec![]);
    backend.reply_to_start(StartReply::Ok {
        body: json!({"success": false, "error": "No hay modelos entrenados"}),
        delay: Duration::ZERO,
    });
    let base = serve(backend).await;

    let err = client(&base)
        .start_job(JobKind::Prediction, &PredictionParams::default().to_form())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("No hay modelos entrenados"));
}

#[tokio::test]
async fn server_error_without_body_keeps_status() {
    let backend = FakeBackend::new(vec![]);
    backend.reply_to_start(StartReply::Text(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
    let base = serve(backend).await;

    let err = client(&base)
        .start_job(JobKind::Training, &TrainingParams::default().to_form())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            ..
        }
    ));
}

#[tokio::test]
async fn inventories() {
    let backend = FakeBackend::new(vec![]);
    let base = serve(backend).await;
    let client = client(&base);

    let files = client.list_data_files().await.unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].is_recommended());
    assert!(!files[1].is_recommended());
    assert_eq!(files[1].modified, None);

    assert_eq!(
        client.available_models().await.unwrap(),
        vec!["sarima", "sarimax", "var", "lstm"]
    );
    assert_eq!(client.trained_models().await.unwrap(), vec!["sarima", "var"]);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .fetch_progress(JobKind::Training)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Transport { .. }));
}
