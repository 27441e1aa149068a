//! Error taxonomy shared by the lifecycle manager and the HTTP surface.
//!
//! Collaborator errors (`StoreError`, `UploadError`, `AuthError`,
//! `VerificationError`) convert into [`ReportError`] via `From`, and
//! `ReportError` renders itself as a JSON response, so handlers can use `?`
//! all the way down.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::UploadError;
use crate::store::StoreError;
use crate::verify::VerificationError;

/// Max chars of a detail message echoed back to clients.
const DETAIL_MAX_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Bad input, fixable by the caller.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credential.
    #[error("{0}")]
    Auth(String),

    /// Authenticated, but not allowed to touch this report.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Operation not valid for the report's current status.
    #[error("{0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("verification unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("verification output malformed: {reason} (raw: {snippet})")]
    VerificationFormat { reason: String, snippet: String },
}

impl ReportError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReportError::Validation(_) | ReportError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ReportError::Auth(_) => StatusCode::UNAUTHORIZED,
            ReportError::Forbidden(_) => StatusCode::FORBIDDEN,
            ReportError::NotFound(_) => StatusCode::NOT_FOUND,
            ReportError::Storage(_)
            | ReportError::VerificationUnavailable(_)
            | ReportError::VerificationFormat { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind, also used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "validation",
            ReportError::Auth(_) => "auth",
            ReportError::Forbidden(_) => "forbidden",
            ReportError::NotFound(_) => "not_found",
            ReportError::InvalidState(_) => "invalid_state",
            ReportError::Storage(_) => "storage",
            ReportError::VerificationUnavailable(_) => "verification_unavailable",
            ReportError::VerificationFormat { .. } => "verification_format",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "Invalid request",
            ReportError::Auth(_) => "Unauthorized",
            ReportError::Forbidden(_) => "Forbidden",
            ReportError::NotFound(_) => "Not found",
            ReportError::InvalidState(_) => "Operation not allowed in current status",
            _ => "Server error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = best_effort_detail(&self);
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.public_message(),
            kind: self.kind(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

/// Display can't fail for these variants, but the message still comes from
/// upstream collaborators, so keep it short and single-line.
fn best_effort_detail(err: &ReportError) -> Option<String> {
    let raw = err.to_string();
    let line: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(DETAIL_MAX_CHARS)
        .collect();
    let line = line.trim().to_string();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

impl From<StoreError> for ReportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ReportError::NotFound(format!("report {id} not found")),
            StoreError::Conflict { id, expected, actual } => ReportError::InvalidState(format!(
                "report {id} is {actual}, expected {expected}"
            )),
            StoreError::Backend(msg) => ReportError::Storage(msg),
        }
    }
}

impl From<UploadError> for ReportError {
    fn from(e: UploadError) -> Self {
        ReportError::Storage(e.to_string())
    }
}

impl From<AuthError> for ReportError {
    fn from(e: AuthError) -> Self {
        ReportError::Auth(e.to_string())
    }
}

impl From<VerificationError> for ReportError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::Unavailable(msg) => ReportError::VerificationUnavailable(msg),
            VerificationError::Format { reason, snippet } => {
                ReportError::VerificationFormat { reason, snippet }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportStatus;

    #[test]
    fn taxonomy_maps_to_http_status() {
        let cases = [
            (ReportError::Validation("x".into()), 400),
            (ReportError::Auth("x".into()), 401),
            (ReportError::Forbidden("x".into()), 403),
            (ReportError::NotFound("x".into()), 404),
            (ReportError::InvalidState("x".into()), 400),
            (ReportError::Storage("x".into()), 500),
            (ReportError::VerificationUnavailable("x".into()), 500),
            (
                ReportError::VerificationFormat {
                    reason: "x".into(),
                    snippet: "y".into(),
                },
                500,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.status_code().as_u16(), code, "{err:?}");
        }
    }

    #[test]
    fn store_conflict_becomes_invalid_state() {
        let err: ReportError = StoreError::Conflict {
            id: "r1".into(),
            expected: ReportStatus::Rejected,
            actual: ReportStatus::Accepted,
        }
        .into();
        assert!(matches!(err, ReportError::InvalidState(_)));
    }

    #[test]
    fn detail_is_single_line_and_bounded() {
        let long = format!("line1\nline2 {}", "z".repeat(1000));
        let detail = best_effort_detail(&ReportError::Storage(long)).unwrap();
        assert!(!detail.contains('\n'));
        assert!(detail.chars().count() <= DETAIL_MAX_CHARS);
    }
}
