//! Device registry: `GET /api/devices`, `POST /api/devices`, and
//! `GET`/`PUT`/`DELETE /api/devices/{device_id}`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, info};

use super::AppState;
use crate::{DeviceUpdate, NewDevice, ServiceError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/devices", get(list).post(create))
        .route(
            "/api/devices/{device_id}",
            get(show).put(update).delete(remove),
        )
}

async fn list(State((store, _)): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    // ---
    info!("GET /api/devices");
    let devices = store.list_devices().await?;
    debug!("Returning {} devices", devices.len());
    Ok(Json(devices))
}

async fn show(
    Path(device_id): Path<String>,
    State((store, _)): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    info!("GET /api/devices/{}", device_id);
    let device = store
        .get_device(&device_id)
        .await?
        .ok_or(ServiceError::DeviceNotFound)?;
    Ok(Json(device))
}

async fn create(
    State((store, _)): State<AppState>,
    body: Result<Json<NewDevice>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Json(body) = body?;
    info!("POST /api/devices");
    let (device_id, name) = body.required_fields()?;

    let device = store
        .create_device(
            device_id,
            name,
            body.location.as_deref(),
            body.status,
            &body.metadata,
        )
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                ServiceError::Conflict(format!("Device '{device_id}' already exists"))
            } else {
                ServiceError::Storage(e)
            }
        })?;

    info!("Registered device {} ({})", device.device_id, device.id);
    Ok((StatusCode::CREATED, Json(device)))
}

async fn update(
    Path(device_id): Path<String>,
    State((store, _)): State<AppState>,
    body: Result<Json<DeviceUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    let Json(body) = body?;
    info!("PUT /api/devices/{}", device_id);

    let device = store
        .update_device(
            &device_id,
            body.name()?,
            body.location.as_deref(),
            body.status,
            body.metadata.as_ref(),
        )
        .await?
        .ok_or(ServiceError::DeviceNotFound)?;

    debug!("Updated device {} ({})", device.device_id, device.id);
    Ok(Json(device))
}

async fn remove(
    Path(device_id): Path<String>,
    State((store, _)): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    // ---
    info!("DELETE /api/devices/{}", device_id);

    if !store.delete_device(&device_id).await? {
        return Err(ServiceError::DeviceNotFound);
    }

    info!("Deleted device {}", device_id);
    Ok(Json(json!({ "message": "Device deleted successfully" })))
}
