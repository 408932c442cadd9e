//! `GET /api/data/query`: raw or time-bucket aggregated readings.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{debug, info};

use super::AppState;
use crate::{run_query, DataQuery, ServiceError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/data/query", get(handler))
}

async fn handler(
    params: Result<Query<DataQuery>, QueryRejection>,
    State((store, config)): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Query(params) = params?;
    info!("GET /api/data/query - {:?}", params);

    let response = run_query(
        &store,
        &params,
        config.query_default_limit,
        &config.aggregation_policy(),
    )
    .await?;

    debug!("GET /api/data/query - Returning {} items", response.count);
    Ok(Json(response))
}
