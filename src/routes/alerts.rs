//! Alerts: `GET /api/alerts`, `POST /api/alerts`,
//! `POST /api/alerts/{id}/resolve`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::AppState;
use crate::{list_alerts, open_alert, resolve_alert, AlertQuery, NewAlert, ServiceError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/alerts", get(list).post(create))
        .route("/api/alerts/{id}/resolve", post(resolve))
}

async fn list(
    params: Result<Query<AlertQuery>, QueryRejection>,
    State((store, config)): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Query(params) = params?;
    info!("GET /api/alerts - {:?}", params);

    let alerts = list_alerts(&store, &params, config.alert_default_limit).await?;
    debug!("Returning {} alerts", alerts.len());
    Ok(Json(json!({ "alerts": alerts })))
}

async fn create(
    State((store, _)): State<AppState>,
    body: Result<Json<NewAlert>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Json(body) = body?;
    info!("POST /api/alerts");

    let alert = open_alert(&store, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "alert": alert }))))
}

async fn resolve(
    id: Result<Path<Uuid>, PathRejection>,
    State((store, _)): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Path(id) = id?;
    info!("POST /api/alerts/{}/resolve", id);

    let alert = resolve_alert(&store, id).await?;
    Ok(Json(json!({ "alert": alert })))
}
