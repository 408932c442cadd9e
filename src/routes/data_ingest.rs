//! `POST /api/data/ingest`: store one reading for a registered device.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::{ingest, IngestRequest, ServiceError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/data/ingest", post(handler))
}

async fn handler(
    State((store, _)): State<AppState>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Json(body) = body?;
    info!("POST /api/data/ingest");
    let reading = ingest(&store, body).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Data ingested successfully",
            "data": reading,
        })),
    ))
}
