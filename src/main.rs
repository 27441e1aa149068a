//! FireWatch report intake: binary entrypoint.
//! Boots the Axum HTTP server: loads config, builds collaborators once, wires routes.

use firewatch::{config::AppConfig, metrics::Metrics, router, AppState};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// JSON logs when LOG_FORMAT=json, compact otherwise. Filter from RUST_LOG.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("firewatch=info,tower_http=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // The runtime may already have installed a subscriber; keep it if so.
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = AppConfig::from_env().map_err(shuttle_runtime::Error::Custom)?;
    let state = AppState::from_config(&cfg).map_err(shuttle_runtime::Error::Custom)?;

    let mut app = router(state);
    if cfg.metrics_route {
        let metrics = Metrics::init().map_err(shuttle_runtime::Error::Custom)?;
        app = app.merge(metrics.router());
        tracing::info!("/metrics enabled");
    }

    tracing::info!("report intake ready");
    Ok(app.into())
}
