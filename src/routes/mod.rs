//! Route gateway: merges every endpoint's subrouter and binds shared state.
//!
//! Each sibling module exports a `router()` and nothing else; `main.rs` only
//! sees [`router`] (EMBP).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use tracing::error;

use crate::{Config, PgStore, ServiceError};

mod alerts;
mod data_export;
mod data_fields;
mod data_ingest;
mod data_query;
mod devices;
mod health;

/// State shared by every handler.
pub type AppState = (PgStore, Config);

// ---

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(devices::router())
        .merge(alerts::router())
        .merge(data_ingest::router())
        .merge(data_query::router())
        .merge(data_fields::router())
        .merge(data_export::router())
        .merge(health::router())
        .with_state((PgStore::new(pool), config))
}

/// `{"error": "<message>"}` with the given status.
pub(crate) fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    // ---
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        // ---
        if let ServiceError::Storage(e) = &self {
            error!("Storage failure: {}", e);
        }
        error_body(self.status(), self.public_message())
    }
}
