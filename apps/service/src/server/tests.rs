#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use apply_engine::{ApplyEngine, ConfirmDecision, JobId};

use super::{AppState, build_router};
use crate::build_state;
use crate::config::Config;

const DEMO_JOB: &str = "acme::staff-engineer";

fn test_config() -> Config {
    Config {
        confirmation_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

fn test_state() -> AppState {
    build_state(test_config()).expect("state must build")
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request must build")
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn healthz_reports_ok() -> Result<()> {
    let app = build_router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 0);
    Ok(())
}

#[tokio::test]
async fn trigger_returns_accepted_with_stream_path() -> Result<()> {
    let app = build_router(test_state());
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/v1/jobs/{DEMO_JOB}/apply"),
            r#"{"mode": "semi_auto"}"#,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await?;
    assert_eq!(body["job_id"], DEMO_JOB);
    assert_eq!(body["mode"], "semi_auto");
    assert_eq!(
        body["stream_path"],
        format!("/v1/jobs/{DEMO_JOB}/apply/stream")
    );
    assert!(body["session_id"].is_string());
    Ok(())
}

#[tokio::test]
async fn duplicate_trigger_conflicts_while_session_is_live() -> Result<()> {
    let app = build_router(test_state());
    let first = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/v1/jobs/{DEMO_JOB}/apply"),
            "{}",
        ))
        .await?;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .oneshot(json_request(
            Method::POST,
            &format!("/v1/jobs/{DEMO_JOB}/apply"),
            "{}",
        ))
        .await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = json_body(second).await?;
    assert_eq!(body["error"], "conflict");
    Ok(())
}

#[tokio::test]
async fn unknown_job_is_not_found() -> Result<()> {
    let app = build_router(test_state());
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/v1/jobs/ghost::role/apply",
            "{}",
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await?;
    assert_eq!(body["error"], "not_found");
    Ok(())
}

#[tokio::test]
async fn confirm_without_a_session_is_not_found() -> Result<()> {
    let app = build_router(test_state());
    let response = app
        .oneshot(json_request(
            Method::POST,
            &format!("/v1/jobs/{DEMO_JOB}/apply/confirm"),
            r#"{"decision": "confirm"}"#,
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn stream_without_a_session_is_not_found() -> Result<()> {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{DEMO_JOB}/apply/stream"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn sse_stream_carries_the_full_apply_flow() -> Result<()> {
    let state = test_state();
    let engine: Arc<ApplyEngine> = Arc::clone(state.engine());
    let app = build_router(state);
    let job_id = JobId::from(DEMO_JOB);

    let trigger = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/v1/jobs/{DEMO_JOB}/apply"),
            r#"{"mode": "full_auto"}"#,
        ))
        .await?;
    assert_eq!(trigger.status(), StatusCode::ACCEPTED);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/jobs/{DEMO_JOB}/apply/stream"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );

    // Drain the body, confirming once the gate event shows up; the stream
    // closes itself after the terminal event.
    let mut body = response.into_body().into_data_stream();
    let mut transcript = String::new();
    let mut confirmed = false;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        transcript.push_str(&String::from_utf8_lossy(&chunk));
        if !confirmed && transcript.contains("event: confirmation_needed") {
            engine.confirm(&job_id, ConfirmDecision::Confirm)?;
            confirmed = true;
        }
    }

    assert!(transcript.contains("event: started"));
    assert!(transcript.contains("event: form_filled"));
    assert!(transcript.contains("event: submitted"));
    assert!(transcript.contains("event: done"));
    assert_eq!(engine.active_sessions(), 0);
    Ok(())
}
