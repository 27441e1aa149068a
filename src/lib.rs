// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod report;
pub mod storage;
pub mod store;
pub mod verify;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::ReportError;
pub use crate::lifecycle::Lifecycle;

use axum::Router;

/// Build the full router from process env, without installing the metrics recorder.
///
/// Collaborators are constructed here, once, and owned by the returned router.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = config::AppConfig::from_env()?;
    let state = AppState::from_config(&cfg)?;
    Ok(router(state))
}
