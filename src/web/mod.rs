// Web server: read-only JSON API over the record store for the dashboard.
//
// Every route is a GET. The pipeline is the store's only writer, so the API
// has no way to create, change or delete records.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::RecordStore;
use crate::pipeline::ReadinessLatch;

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    /// Reports whether the first ingestion pass has finished.
    pub latch: ReadinessLatch,
    pub keywords: Arc<Vec<String>>,
}

/// Serve the API until `shutdown` carries `true`.
pub async fn run_server(
    state: AppState,
    web_origin: &str,
    bind: &str,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = build_router(state, web_origin)?;

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("disaster-watch API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

pub fn build_router(state: AppState, web_origin: &str) -> Result<Router> {
    let origin: HeaderValue = web_origin
        .parse()
        .with_context(|| format!("Invalid DISASTER_WEB_ORIGIN: {web_origin}"))?;

    let router = Router::new()
        .route("/health", get(health))
        .route("/tweets", get(handlers::records::list_all))
        .route(
            "/tweets/keyword/{keyword}",
            get(handlers::records::list_by_keyword),
        )
        .route("/tweets/locations", get(handlers::records::list_located))
        .route("/tweets/scored", get(handlers::records::list_scored))
        .route("/api/status", get(handlers::status::get_status))
        .layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

/// Liveness probe: always returns 200 OK.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}
