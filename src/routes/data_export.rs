//! `GET /api/data/export`: readings as a CSV download or plain JSON.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::AppState;
use crate::{export_filename, fetch_for_query, readings_to_csv, DataQuery, ServiceError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/data/export", get(handler))
}

/// Same window parameters as `/api/data/query`, plus the output format.
#[derive(Debug, Deserialize)]
struct ExportQuery {
    device_id: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    limit: Option<String>,
    /// `csv` (default) or `json`.
    format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExportFormat {
    Csv,
    Json,
}

fn export_format(raw: Option<&str>) -> Result<ExportFormat, ServiceError> {
    // ---
    match raw.map(str::trim) {
        None | Some("") | Some("csv") => Ok(ExportFormat::Csv),
        Some("json") => Ok(ExportFormat::Json),
        Some(other) => Err(ServiceError::BadRequest(format!(
            "Unsupported format: {other} (expected csv or json)"
        ))),
    }
}

async fn handler(
    params: Result<Query<ExportQuery>, QueryRejection>,
    State((store, config)): State<AppState>,
) -> Result<Response, ServiceError> {
    // ---
    let Query(params) = params?;
    info!("GET /api/data/export - {:?}", params);
    let format = export_format(params.format.as_deref())?;

    let window = DataQuery {
        device_id: params.device_id,
        start_time: params.start_time,
        end_time: params.end_time,
        limit: params.limit,
        ..Default::default()
    };
    let readings = fetch_for_query(&store, &window, config.export_default_limit).await?;
    debug!("Exporting {} readings as {:?}", readings.len(), format);

    if format == ExportFormat::Json {
        return Ok(Json(json!({ "data": readings })).into_response());
    }

    if readings.is_empty() {
        return Ok((StatusCode::NOT_FOUND, "No data found").into_response());
    }

    // `fetch_for_query` already rejected a missing device_id
    let device_id = window.device_id.as_deref().unwrap_or_default();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_filename(device_id.trim(), Utc::now())
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        readings_to_csv(&readings),
    )
        .into_response())
}
