//! Service-level errors shared by the query, ingest and device endpoints.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
};
use thiserror::Error;

use crate::AggregationError;

// ---

#[derive(Debug, Error)]
pub enum ServiceError {
    // ---
    #[error("{0}")]
    BadRequest(String),

    #[error("Device not found")]
    DeviceNotFound,

    #[error("Alert not found")]
    AlertNotFound,

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("data access failed: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ServiceError {
    // ---
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) | ServiceError::Aggregation(_) => StatusCode::BAD_REQUEST,
            ServiceError::DeviceNotFound | ServiceError::AlertNotFound => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients; storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Storage(_) => "Failed to access data".to_string(),
            other => other.to_string(),
        }
    }
}

// Extractor rejections keep the `{"error": ...}` body shape.

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}
