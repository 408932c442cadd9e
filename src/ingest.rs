//! Write-side pipeline for `POST /api/data/ingest`.
//!
//! Payloads are stored as-is: the service does not validate field sets
//! against any per-device schema.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::store::{PgStore, RowSource};
use crate::{parse_timestamp, IngestRequest, Reading, ServiceError};

// ---

/// An ingest request that passed validation.
#[derive(Debug, PartialEq)]
pub struct ValidIngest {
    // ---
    pub device_id: String,
    pub time: DateTime<Utc>,
    pub data: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

/// Check required fields and resolve the reading timestamp (`now` if absent).
pub fn validate_ingest(req: IngestRequest, now: DateTime<Utc>) -> Result<ValidIngest, ServiceError> {
    // ---
    let device_id = req
        .device_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    let (device_id, data) = match (device_id, req.data) {
        (Some(id), Some(Value::Object(data))) => (id, data),
        (Some(_), Some(_)) => {
            return Err(ServiceError::BadRequest("data must be a JSON object".into()))
        }
        _ => {
            return Err(ServiceError::BadRequest(
                "device_id and data are required".into(),
            ))
        }
    };

    let time = match req.timestamp.as_deref() {
        None => now,
        Some(raw) => parse_timestamp(raw)
            .ok_or_else(|| ServiceError::BadRequest(format!("Invalid timestamp: {raw}")))?,
    };

    Ok(ValidIngest {
        device_id,
        time,
        data,
        metadata: req.metadata.unwrap_or_default(),
    })
}

/// Validate and store one reading for a registered device.
pub async fn ingest(store: &PgStore, req: IngestRequest) -> Result<Reading, ServiceError> {
    // ---
    let valid = validate_ingest(req, Utc::now())?;
    debug!(
        "Ingesting {} fields for {} at {}",
        valid.data.len(),
        valid.device_id,
        valid.time
    );

    let device = store
        .resolve_device(&valid.device_id)
        .await?
        .ok_or(ServiceError::DeviceNotFound)?;

    let reading = store
        .insert_reading(device, valid.time, &valid.data, &valid.metadata)
        .await?;

    info!("Stored reading for {}", valid.device_id);
    Ok(reading)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn request(body: Value) -> IngestRequest {
        serde_json::from_value(body).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    #[test]
    fn test_timestamp_defaults_to_now() {
        // ---
        let valid = validate_ingest(
            request(json!({ "device_id": "thermo-1", "data": { "temp": 21 } })),
            now(),
        )
        .unwrap();

        assert_eq!(valid.device_id, "thermo-1");
        assert_eq!(valid.time, now());
        assert_eq!(valid.data["temp"], json!(21));
        assert!(valid.metadata.is_empty());
    }

    #[test]
    fn test_explicit_timestamp_and_metadata_kept() {
        // ---
        let valid = validate_ingest(
            request(json!({
                "device_id": "thermo-1",
                "data": { "temp": 21 },
                "timestamp": "2025-03-26T10:00:00Z",
                "metadata": { "firmware": "1.2.0" }
            })),
            now(),
        )
        .unwrap();

        assert_eq!(valid.time, Utc.with_ymd_and_hms(2025, 3, 26, 10, 0, 0).unwrap());
        assert_eq!(valid.metadata["firmware"], json!("1.2.0"));
    }

    #[test]
    fn test_missing_or_malformed_fields_rejected() {
        // ---
        for body in [
            json!({ "data": { "temp": 21 } }),
            json!({ "device_id": "thermo-1" }),
            json!({ "device_id": "", "data": { "temp": 21 } }),
            json!({ "device_id": "thermo-1", "data": [1, 2, 3] }),
            json!({ "device_id": "thermo-1", "data": { "temp": 21 }, "timestamp": "soon" }),
        ] {
            let err = validate_ingest(request(body.clone()), now()).unwrap_err();
            assert!(
                matches!(err, ServiceError::BadRequest(_)),
                "expected bad request for {body}"
            );
        }
    }
}
