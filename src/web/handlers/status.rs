// GET /api/status: store counts plus pipeline readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::web::{api_error, AppState};

pub async fn get_status(State(state): State<AppState>) -> Response {
    let counts = match state.store.counts().await {
        Ok(counts) => counts,
        Err(e) => {
            error!(error = %e, "Failed to count records");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load status");
        }
    };
    let by_keyword: serde_json::Map<String, serde_json::Value> = state
        .store
        .keyword_counts()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|(keyword, n)| (keyword, serde_json::Value::from(n)))
        .collect();

    Json(serde_json::json!({
        "ready": state.latch.is_open(),
        "keywords": state.keywords.as_ref(),
        "counts": counts,
        "by_keyword": by_keyword,
    }))
    .into_response()
}
