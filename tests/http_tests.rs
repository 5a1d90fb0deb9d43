// HTTP control API, exercised through the router without binding a socket

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use surface_agent::audio::{CaptureConfig, CaptureDevice, CaptureSourceFactory, SinkConfig, WavFileSink};
use surface_agent::automation::{ClickTarget, ClickTargets, Dispatcher, HeadlessSurface};
use surface_agent::session::{RecordingController, SessionConfig};
use surface_agent::{create_router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

fn app(temp: &TempDir) -> Result<Router> {
    let sink = WavFileSink::new(SinkConfig::new(temp.path().to_path_buf()))?;
    let factory = CaptureSourceFactory::new(CaptureDevice::None, CaptureConfig::default());
    let controller = Arc::new(RecordingController::new(
        SessionConfig::default(),
        Arc::new(factory),
        Arc::new(sink),
    ));
    let targets = ClickTargets::from_targets(vec![ClickTarget {
        name: "start".to_string(),
        u: 0.25,
        v: 0.5,
    }]);
    let surface = Arc::new(HeadlessSurface::new("Remote Desktop", 640, 480));
    let dispatcher = Arc::new(Dispatcher::new(surface, targets, controller));

    Ok(create_router(AppState::new(dispatcher)))
}

async fn send(app: Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
    let response = app.oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn post_json(uri: &str, json: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))?)
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(app(&temp)?, get("/health")?).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    Ok(())
}

#[tokio::test]
async fn test_run_command_clicks_named_target() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(
        app(&temp)?,
        post_json("/commands", serde_json::json!({ "command": "click start" }))?,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_slice(&body)?;
    assert_eq!(result["ok"], true);
    assert_eq!(result["clicked"], serde_json::json!([160, 240]));
    // No capture device configured, so no session
    assert!(result.get("session_id").is_none());
    Ok(())
}

#[tokio::test]
async fn test_run_command_rejects_bad_command() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(
        app(&temp)?,
        post_json("/commands", serde_json::json!({ "command": "clickuv 2 2" }))?,
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let result: Value = serde_json::from_slice(&body)?;
    assert_eq!(result["ok"], false);
    assert!(result["message"].as_str().unwrap_or_default().contains("between 0 and 1"));
    Ok(())
}

#[tokio::test]
async fn test_list_targets() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(app(&temp)?, get("/targets")?).await?;

    assert_eq!(status, StatusCode::OK);
    let targets: Vec<ClickTarget> = serde_json::from_slice(&body)?;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "start");
    Ok(())
}

#[tokio::test]
async fn test_session_start_without_device_is_unavailable() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(app(&temp)?, post_json("/session/start", Value::Null)?).await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: Value = serde_json::from_slice(&body)?;
    assert!(error["error"]
        .as_str()
        .unwrap_or_default()
        .contains("No capture device configured"));
    Ok(())
}

#[tokio::test]
async fn test_session_stop_when_idle() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(app(&temp)?, post_json("/session/stop", Value::Null)?).await?;

    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_slice(&body)?;
    assert_eq!(response["status"], "idle");
    assert!(response["report"].is_null());
    Ok(())
}

#[tokio::test]
async fn test_session_status_when_idle() -> Result<()> {
    let temp = TempDir::new()?;

    let (status, body) = send(app(&temp)?, get("/session/status")?).await?;

    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_slice(&body)?;
    assert_eq!(response["state"], "idle");
    assert!(response["session"].is_null());
    assert!(response["last_report"].is_null());
    Ok(())
}

#[tokio::test]
async fn test_click_screenshot_after_click() -> Result<()> {
    let temp = TempDir::new()?;
    let app = app(&temp)?;

    let (status, _) = send(app.clone(), get("/screenshot/click")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app.clone(),
        post_json("/commands", serde_json::json!({ "command": "click 20 30" }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get("/screenshot/click")?).await?;
    assert_eq!(status, StatusCode::OK);
    let shot: Value = serde_json::from_slice(&body)?;
    assert_eq!(shot["width"], 640);
    assert_eq!(shot["height"], 480);
    assert_eq!(shot["encoding"], "rgba8");
    Ok(())
}
