// tests/e2e_smoke.rs
//
// Full router built from process env (`firewatch::app()`), mock classifier,
// static tokens, in-memory storage. Submit, poll, override.

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use serial_test::serial;
use tower::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "smoke";

fn set_env(vision_mode: &str) {
    std::env::set_var("VISION_MODE", vision_mode);
    std::env::set_var("VISION_CONFIG_PATH", "config/does-not-exist.json");
    std::env::set_var("AUTH_MODE", "static");
    std::env::set_var("AUTH_STATIC_TOKENS", "tok-1:user-1,tok-2:user-2");
    for k in [
        "CLOUDINARY_CLOUD_NAME",
        "CLOUDINARY_API_KEY",
        "CLOUDINARY_API_SECRET",
    ] {
        std::env::remove_var(k);
    }
}

async fn build_app(vision_mode: &str) -> Router {
    set_env(vision_mode);
    firewatch::app().await.expect("app() should build from env")
}

fn submit(token: &str) -> Request<Body> {
    let mut body = String::new();
    for (k, v) in [
        ("title", "Barn fire"),
        ("description", "Roof is burning"),
        ("severity", "MED"),
        ("lat", "-33.86"),
        ("lng", "151.2"),
        ("deviceName", "iPhone"),
        ("deviceTime", "2025-08-16T10:00:00Z"),
    ] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{k}\"\r\n\r\n{v}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{BOUNDARY}--\r\n"
    ));
    Request::builder()
        .method("POST")
        .uri("/reports")
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn read_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn poll_status(app: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let resp = app
            .clone()
            .oneshot(
                Request::get(format!("/reports/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = read_json(resp).await;
        if v["status"] != "PENDING_VERIFICATION" {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("stuck in PENDING_VERIFICATION");
}

#[tokio::test]
#[serial]
async fn smoke_mock_classifier_accepts() {
    let app = build_app("mock").await;

    let resp = app.clone().oneshot(submit("tok-1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let id = read_json(resp).await["reportId"]
        .as_str()
        .unwrap()
        .to_string();

    let v = poll_status(&app, &id).await;
    assert_eq!(v["status"], "ACCEPTED");
    assert_eq!(v["uid"], "user-1");
    assert_eq!(v["severity"], "MED");
}

#[tokio::test]
#[serial]
async fn smoke_unavailable_classifier_rejects_then_owner_overrides() {
    let app = build_app("error").await;

    let resp = app.clone().oneshot(submit("tok-2")).await.unwrap();
    let id = read_json(resp).await["reportId"]
        .as_str()
        .unwrap()
        .to_string();

    let v = poll_status(&app, &id).await;
    assert_eq!(v["status"], "REJECTED");
    let reason = v["verificationResult"]["reasons"][0].as_str().unwrap();
    assert!(reason.starts_with("Verification failed:"), "{reason}");

    let resp = app
        .clone()
        .oneshot(
            Request::post(format!("/reports/{id}/override"))
                .header("authorization", "Bearer tok-2")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"consent":true}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await["status"], "ACCEPTED_OVERRIDE");
}
