// Integration tests for the HTTP command surface

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{Behavior, MockCollector};
use serde_json::{json, Value};
use std::time::Duration;
use tab_audio_streamer::transport::ClientMessage;
use tab_audio_streamer::{
    create_router, AppState, AudioSourceConfig, RecordingCoordinator, SessionConfig,
};
use tower::ServiceExt;

fn app(collector: &MockCollector) -> Router {
    let config = SessionConfig {
        collector: collector.transport_config(),
        chunk_duration: Duration::from_millis(100),
        audio: AudioSourceConfig::default(),
    };
    create_router(AppState::new(RecordingCoordinator::new(config)))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let collector = MockCollector::start(Behavior::Normal).await?;
    let app = app(&collector);

    let (status, body) = call(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));

    Ok(())
}

#[tokio::test]
async fn test_start_status_stop() -> Result<()> {
    let collector = MockCollector::start(Behavior::Normal).await?;
    let app = app(&collector);

    let (status, body) = call(&app, "GET", "/recording/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isRecording"], false);
    assert_eq!(body["state"], "idle");

    let start = json!({
        "source": { "kind": "tone", "frequency_hz": 440.0 },
        "tabUrl": "https://example.com/stream",
        "tabTitle": "Stream"
    });
    let (status, body) = call(&app, "POST", "/recording/start", Some(start.clone())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["sessionId"], "session-1");
    assert!(body.get("error").is_none());

    let (status, body) = call(&app, "POST", "/recording/start", Some(start)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some());

    let (_, body) = call(&app, "GET", "/recording/status", None).await?;
    assert_eq!(body["isRecording"], true);
    assert_eq!(body["state"], "recording");
    assert_eq!(body["sessionId"], "session-1");

    let (status, body) = call(&app, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (_, body) = call(&app, "GET", "/recording/status", None).await?;
    assert_eq!(body["isRecording"], false);

    collector.wait_closed(1).await?;
    let metadata = collector
        .messages()
        .await
        .into_iter()
        .find_map(|message| match message {
            ClientMessage::Metadata { metadata } => Some(metadata),
            _ => None,
        })
        .expect("metadata sent");
    assert_eq!(metadata.tab_title.as_deref(), Some("Stream"));

    Ok(())
}

#[tokio::test]
async fn test_stop_when_idle() -> Result<()> {
    let collector = MockCollector::start(Behavior::Normal).await?;
    let app = app(&collector);

    let (status, body) = call(&app, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    Ok(())
}

#[tokio::test]
async fn test_start_fails_when_collector_rejects() -> Result<()> {
    let collector = MockCollector::start(Behavior::Reject("busy".to_string())).await?;
    let app = app(&collector);

    let start = json!({ "source": { "kind": "tone", "frequency_hz": 440.0 } });
    let (status, body) = call(&app, "POST", "/recording/start", Some(start)).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap_or_default().contains("busy"));

    let (_, body) = call(&app, "GET", "/recording/status", None).await?;
    assert_eq!(body["state"], "idle");

    Ok(())
}
