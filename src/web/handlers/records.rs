// Record list handlers.
//
// GET /tweets                  : every stored record
// GET /tweets/keyword/{keyword}: records matched by one keyword
// GET /tweets/locations        : records with coordinates
// GET /tweets/scored           : records the classifier kept
//
// Responses are bare JSON arrays, oldest first.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::db::Record;
use crate::web::{api_error, AppState};

/// Wire shape of a record. Coordinates are flattened into two nullable
/// fields and the creation time keeps the source's camelCase name.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub id: i64,
    pub author: String,
    pub text: String,
    pub original_text: String,
    pub keyword: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub url: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub score: Option<i64>,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            author: record.author,
            text: record.text,
            original_text: record.original_text,
            keyword: record.keyword,
            created_at: record.created_at,
            url: record.url,
            location: record.location,
            latitude: record.coordinates.map(|c| c.latitude),
            longitude: record.coordinates.map(|c| c.longitude),
            score: record.score,
        }
    }
}

fn records_response(result: anyhow::Result<Vec<Record>>) -> Response {
    match result {
        Ok(records) => {
            let views: Vec<RecordView> = records.into_iter().map(RecordView::from).collect();
            Json(views).into_response()
        }
        Err(e) => {
            error!(error = %e, "Record query failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load records")
        }
    }
}

pub async fn list_all(State(state): State<AppState>) -> Response {
    records_response(state.store.list_all().await)
}

pub async fn list_by_keyword(
    State(state): State<AppState>,
    Path(keyword): Path<String>,
) -> Response {
    records_response(state.store.list_by_keyword(&keyword).await)
}

pub async fn list_located(State(state): State<AppState>) -> Response {
    records_response(state.store.list_located().await)
}

pub async fn list_scored(State(state): State<AppState>) -> Response {
    records_response(state.store.list_scored().await)
}
