use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{build_identity_verifier, AuthUser, DynIdentityVerifier};
use crate::config::AppConfig;
use crate::error::ReportError;
use crate::lifecycle::{Lifecycle, ReportPage, SubmitReceipt};
use crate::report::{Report, ReportDraft, ReportStatus, Severity};
use crate::storage::{CloudinaryStorage, DynObjectStorage, MemoryObjectStorage};
use crate::store::{InMemoryReportStore, ReportFilter};
use crate::verify::build_vision_client;

/// Extra room on top of the image for the text fields and multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 2 * 1024 * 1024;

/// Process-wide collaborators, built once before serving and dropped with the router.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Lifecycle,
    pub identity: DynIdentityVerifier,
    pub max_image_bytes: usize,
}

impl AppState {
    pub fn new(lifecycle: Lifecycle, identity: DynIdentityVerifier, max_image_bytes: usize) -> Self {
        Self {
            lifecycle,
            identity,
            max_image_bytes,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let vision = build_vision_client(&cfg.vision)?;
        let upload_timeout = Duration::from_secs(cfg.storage.upload_timeout_secs);
        let storage: DynObjectStorage = match &cfg.storage.cloudinary {
            Some(c) => Arc::new(CloudinaryStorage::new(c.clone(), upload_timeout)?),
            None => {
                warn!(target: "storage", "Cloudinary credentials missing; images kept in memory");
                Arc::new(MemoryObjectStorage::new())
            }
        };
        let identity = build_identity_verifier(&cfg.auth)?;
        info!(
            vision_mode = ?cfg.vision.mode,
            model = %cfg.vision.model,
            storage = storage.name(),
            auth_mode = ?cfg.auth.mode,
            "collaborators initialized"
        );

        let lifecycle = Lifecycle::new(
            Arc::new(InMemoryReportStore::new()),
            vision,
            storage,
            upload_timeout,
        );
        Ok(Self::new(lifecycle, identity, cfg.max_image_bytes))
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_image_bytes + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route("/health", get(health))
        .route("/reports", post(create_report).get(list_reports))
        .route("/reports/mine", get(my_reports))
        .route("/reports/{id}", get(get_report))
        .route("/reports/{id}/override", post(override_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    ok: bool,
    time: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        ok: true,
        time: chrono::Utc::now().to_rfc3339(),
    })
}

async fn create_report(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<SubmitReceipt>, ReportError> {
    let mut draft = ReportDraft::default();
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ReportError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ReportError::Validation(format!("unreadable image: {e}")))?;
            if bytes.len() > state.max_image_bytes {
                return Err(ReportError::Validation(format!(
                    "image exceeds {} bytes",
                    state.max_image_bytes
                )));
            }
            image = Some(bytes.to_vec());
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ReportError::Validation(format!("unreadable field {name}: {e}")))?;
            draft.set(&name, text);
        }
    }

    let image = image.ok_or_else(|| {
        ReportError::Validation("image is required (multipart field name: image)".to_string())
    })?;

    let receipt = state.lifecycle.submit(&user.uid, &draft, image).await?;
    Ok(Json(receipt))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Report>, ReportError> {
    Ok(Json(state.lifecycle.get(&id).await?))
}

/// Query values arrive as loose strings; numbers that don't parse fall back to defaults.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    severity: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

fn loose_int(v: &Option<String>) -> Option<i64> {
    v.as_deref().and_then(|s| s.trim().parse::<i64>().ok())
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

async fn list_reports(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ReportPage>, ReportError> {
    let filter = ReportFilter {
        status: non_blank(&q.status)
            .map(|s| s.parse::<ReportStatus>())
            .transpose()?,
        severity: non_blank(&q.severity)
            .map(|s| s.parse::<Severity>())
            .transpose()?,
    };
    let page = state
        .lifecycle
        .list_all(&filter, loose_int(&q.page), loose_int(&q.limit))
        .await?;
    Ok(Json(page))
}

#[derive(Serialize)]
struct MineResp {
    items: Vec<Report>,
}

async fn my_reports(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<MineResp>, ReportError> {
    let items = state
        .lifecycle
        .list_by_owner(&user.uid, loose_int(&q.limit))
        .await?;
    Ok(Json(MineResp { items }))
}

async fn override_report(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Report>, ReportError> {
    // Only a literal JSON `true` counts as consent.
    let consent = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("consent").cloned())
        == Some(Value::Bool(true));
    let report = state
        .lifecycle
        .override_report(&id, &user.uid, consent)
        .await?;
    Ok(Json(report))
}
