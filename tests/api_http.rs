// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /reports (multipart, auth, validation)
// - GET /reports/{id}, /reports, /reports/mine
// - POST /reports/{id}/override

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use firewatch::auth::StaticTokenVerifier;
use firewatch::config::StaticToken;
use firewatch::report::{ImageRef, ReportDraft, ReportStatus};
use firewatch::storage::MemoryObjectStorage;
use firewatch::store::InMemoryReportStore;
use firewatch::verify::{StaticVisionClient, Verdict};
use firewatch::{router, AppState, Lifecycle};

const BODY_LIMIT: usize = 1024 * 1024;
const BOUNDARY: &str = "firewatch-test-boundary";
const MAX_IMAGE: usize = 64 * 1024;

fn tokens() -> Vec<StaticToken> {
    vec![
        StaticToken {
            token: "alice-token".into(),
            uid: "alice".into(),
            email: Some("alice@example.org".into()),
        },
        StaticToken {
            token: "bob-token".into(),
            uid: "bob".into(),
            email: None,
        },
    ]
}

fn test_state(verdict: Verdict) -> AppState {
    let lifecycle = Lifecycle::new(
        Arc::new(InMemoryReportStore::new()),
        Arc::new(StaticVisionClient::returning(verdict.with_model("test-model"))),
        Arc::new(MemoryObjectStorage::new()),
        Duration::from_secs(5),
    );
    AppState::new(lifecycle, Arc::new(StaticTokenVerifier::new(tokens())), MAX_IMAGE)
}

fn test_router(state: &AppState) -> Router {
    router(state.clone())
}

const FULL_FIELDS: &[(&str, &str)] = &[
    ("title", "Smoke by the highway"),
    ("description", "Visible flames on the slope"),
    ("severity", "high"),
    ("lat", "45.81"),
    ("lng", "15.98"),
    ("deviceName", "Pixel 8"),
    ("deviceTime", "2025-08-16T10:00:00Z"),
];

fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        out.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"fire.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        out.extend_from_slice(bytes);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

fn submit_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri("/reports")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(Body::from(body)).expect("build POST /reports")
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(Body::empty()).expect("build GET")
}

fn override_request(id: &str, token: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/reports/{id}/override"))
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST override")
}

async fn json_body(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll GET /reports/{id} until verification has resolved the report.
async fn wait_terminal(state: &AppState, id: &str) -> Json {
    for _ in 0..500 {
        let resp = test_router(state)
            .oneshot(get(&format!("/reports/{id}"), None))
            .await
            .expect("oneshot get");
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json_body(resp).await;
        if v["status"] != "PENDING_VERIFICATION" {
            return v;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("report {id} stayed pending");
}

/// Seed a report straight through the lifecycle and resolve it.
async fn seed(state: &AppState, owner: &str) -> String {
    let mut d = ReportDraft::default();
    for (k, v) in FULL_FIELDS {
        d.set(k, v.to_string());
    }
    let report = state
        .lifecycle
        .create(
            owner,
            d.validate().expect("valid"),
            ImageRef {
                url: "memory://seed.jpg".into(),
                storage_id: "seed".into(),
            },
        )
        .await
        .expect("seed");
    state.lifecycle.run_verification(&report.id).await;
    report.id
}

#[tokio::test]
async fn api_health_returns_ok_and_time() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let resp = test_router(&state)
        .oneshot(get("/health", None))
        .await
        .expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["ok"], true);
    assert!(v["time"].is_string());
}

#[tokio::test]
async fn submit_returns_pending_then_resolves_to_accepted() {
    let state = test_state(Verdict::new(true, 0.92, false, 0.0));
    let resp = test_router(&state)
        .oneshot(submit_request(
            Some("alice-token"),
            multipart_body(FULL_FIELDS, Some(b"\xFF\xD8\xFFfakejpeg")),
        ))
        .await
        .expect("oneshot submit");
    assert_eq!(resp.status(), StatusCode::OK);
    let receipt = json_body(resp).await;
    assert_eq!(receipt["status"], "PENDING_VERIFICATION");
    let id = receipt["reportId"].as_str().expect("reportId").to_string();

    let done = wait_terminal(&state, &id).await;
    assert_eq!(done["status"], "ACCEPTED");
    assert_eq!(done["uid"], "alice");
    assert_eq!(done["severity"], "HIGH");
    assert_eq!(done["verificationResult"]["model"], "test-model");
    assert!(done["image"]["url"].as_str().unwrap().starts_with("memory://"));
    assert!(done.get("override").is_none());
}

#[tokio::test]
async fn submit_without_token_is_401() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let resp = test_router(&state)
        .oneshot(submit_request(None, multipart_body(FULL_FIELDS, Some(b"img"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let v = json_body(resp).await;
    assert_eq!(v["kind"], "auth");

    let resp = test_router(&state)
        .oneshot(submit_request(
            Some("forged"),
            multipart_body(FULL_FIELDS, Some(b"img")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_missing_lat_is_400_and_persists_nothing() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let fields: Vec<_> = FULL_FIELDS
        .iter()
        .copied()
        .filter(|(k, _)| *k != "lat")
        .collect();
    let resp = test_router(&state)
        .oneshot(submit_request(
            Some("alice-token"),
            multipart_body(&fields, Some(b"img")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert_eq!(v["kind"], "validation");
    assert!(v["detail"].as_str().unwrap().contains("lat"));

    let page = json_body(test_router(&state).oneshot(get("/reports", None)).await.unwrap()).await;
    assert_eq!(page["pagination"]["total"], 0);
}

#[tokio::test]
async fn submit_without_image_is_400() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let resp = test_router(&state)
        .oneshot(submit_request(
            Some("alice-token"),
            multipart_body(FULL_FIELDS, None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert!(v["detail"].as_str().unwrap().contains("image"));
}

#[tokio::test]
async fn oversized_image_is_400() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let big = vec![0u8; MAX_IMAGE + 1];
    let resp = test_router(&state)
        .oneshot(submit_request(
            Some("alice-token"),
            multipart_body(FULL_FIELDS, Some(&big)),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_report_is_404() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let resp = test_router(&state)
        .oneshot(get("/reports/nope", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["kind"], "not_found");
}

#[tokio::test]
async fn listing_caps_limit_and_floors_page() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    seed(&state, "alice").await;
    seed(&state, "bob").await;

    let v = json_body(
        test_router(&state)
            .oneshot(get("/reports?limit=500&page=0", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(v["pagination"]["limit"], 200);
    assert_eq!(v["pagination"]["page"], 1);
    assert_eq!(v["pagination"]["total"], 2);
    assert_eq!(v["pagination"]["totalPages"], 1);
    assert_eq!(v["items"].as_array().unwrap().len(), 2);

    // Unparseable numbers fall back to defaults.
    let v = json_body(
        test_router(&state)
            .oneshot(get("/reports?limit=abc", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(v["pagination"]["limit"], 20);

    let v = json_body(
        test_router(&state)
            .oneshot(get("/reports?status=ACCEPTED&severity=low", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(v["pagination"]["total"], 0);
}

#[tokio::test]
async fn unknown_status_filter_is_400() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    let resp = test_router(&state)
        .oneshot(get("/reports?status=BURNING", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mine_lists_only_the_callers_reports() {
    let state = test_state(Verdict::new(true, 0.9, false, 0.0));
    seed(&state, "alice").await;
    seed(&state, "alice").await;
    seed(&state, "bob").await;

    let resp = test_router(&state)
        .oneshot(get("/reports/mine", Some("alice-token")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    let items = v["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|r| r["uid"] == "alice"));

    let resp = test_router(&state)
        .oneshot(get("/reports/mine", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn override_flow_over_http() {
    let state = test_state(Verdict::new(true, 0.4, false, 0.0));
    let id = seed(&state, "alice").await;
    assert_eq!(
        state.lifecycle.get(&id).await.unwrap().status,
        ReportStatus::Rejected
    );

    // someone else
    let resp = test_router(&state)
        .oneshot(override_request(&id, "bob-token", r#"{"consent":true}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // consent must be literal true
    for body in [r#"{"consent":"true"}"#, r#"{"consent":false}"#, "{}", "not json"] {
        let resp = test_router(&state)
            .oneshot(override_request(&id, "alice-token", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body={body}");
    }
    assert_eq!(
        state.lifecycle.get(&id).await.unwrap().status,
        ReportStatus::Rejected
    );

    let resp = test_router(&state)
        .oneshot(override_request(&id, "alice-token", r#"{"consent":true}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["status"], "ACCEPTED_OVERRIDE");
    assert_eq!(v["override"]["didOverride"], true);
    assert!(v["override"]["consentAt"].is_string());

    // second attempt hits the state check
    let resp = test_router(&state)
        .oneshot(override_request(&id, "alice-token", r#"{"consent":true}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["kind"], "invalid_state");
}

#[tokio::test]
async fn override_unknown_report_is_404() {
    let state = test_state(Verdict::new(true, 0.4, false, 0.0));
    let resp = test_router(&state)
        .oneshot(override_request("ghost", "alice-token", r#"{"consent":true}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
