//! `GET /api/data/fields`: field names a device has been reporting.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::{list_fields, FieldsResponse, ServiceError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/data/fields", get(handler))
}

#[derive(Debug, Deserialize)]
struct FieldsQuery {
    device_id: Option<String>,
}

async fn handler(
    params: Result<Query<FieldsQuery>, QueryRejection>,
    State((store, _)): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Query(params) = params?;
    info!("GET /api/data/fields - {:?}", params.device_id);
    let fields = list_fields(&store, params.device_id.as_deref()).await?;
    Ok(Json(FieldsResponse { fields }))
}
