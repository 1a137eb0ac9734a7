//! REST API of the lifeguard hub
//!
//! ## Endpoints
//!
//! - `GET  /api/v1/health` - Liveness of the hub and its storage
//! - `GET  /api/v1/status` - Monitor snapshot, active alerts, settings
//! - `GET  /api/v1/reports` - Recent stored health reports
//! - `GET  /api/v1/settings` / `PUT /api/v1/settings` - Read / update settings
//! - `POST /api/v1/settings/reload` - Apply persisted settings now
//! - `POST /api/v1/monitor/run` - Run a monitoring cycle now
//! - `GET  /api/v1/lifecycle` - Lifecycle summary
//! - `POST /api/v1/lifecycle/scan` - Scan entities now
//! - `PUT  /api/v1/lifecycle/{id}` - Register or replace an entity
//! - `POST /api/v1/lifecycle/{id}/renew` - Renewal event

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post, put},
};
use tracing::{error, info};

use crate::config::ApiConfig;

/// All routes, without listener or optional layers
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/reports", get(routes::status::list_reports))
        .route(
            "/api/v1/settings",
            get(routes::settings::get_settings).put(routes::settings::update_settings),
        )
        .route(
            "/api/v1/settings/reload",
            post(routes::settings::reload_settings),
        )
        .route("/api/v1/monitor/run", post(routes::status::run_cycle))
        .route("/api/v1/lifecycle", get(routes::lifecycle::get_summary))
        .route("/api/v1/lifecycle/scan", post(routes::lifecycle::scan_now))
        .route("/api/v1/lifecycle/:id", put(routes::lifecycle::register))
        .route("/api/v1/lifecycle/:id/renew", post(routes::lifecycle::renew))
        .with_state(state)
}

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns its local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind);

    let mut app = router(state).layer(TraceLayer::new_for_http());

    if config.cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = crate::util::get_api_token().or(config.token) {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
