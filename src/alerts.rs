//! Alert workflow behind `/api/alerts`: list with filters, open, resolve.
//!
//! Alerts are recorded and resolved by clients; the service does not evaluate
//! `conditions` against incoming readings.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::query::parse_limit;
use crate::store::{AlertFilter, PgStore, RowSource};
use crate::{Alert, AlertSeverity, AlertStatus, NewAlert, ServiceError};

// ---

/// Query parameters for `GET /api/alerts`. Blank values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    // ---
    pub status: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<String>,
}

/// A `POST /api/alerts` body that passed validation.
#[derive(Debug, PartialEq)]
pub struct ValidAlert {
    // ---
    pub title: String,
    pub description: Option<String>,
    pub device_id: Option<String>,
    pub severity: AlertSeverity,
    pub conditions: Map<String, Value>,
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn alert_filter(params: &AlertQuery, default_limit: u32) -> Result<AlertFilter, ServiceError> {
    // ---
    let status = match non_blank(params.status.clone()) {
        Some(raw) => Some(raw.parse::<AlertStatus>()?),
        None => None,
    };
    let severity = match non_blank(params.severity.clone()) {
        Some(raw) => Some(raw.parse::<AlertSeverity>()?),
        None => None,
    };

    Ok(AlertFilter {
        status,
        severity,
        limit: parse_limit(params.limit.as_deref(), default_limit)?,
    })
}

/// `title`, `severity` and an object-valued `conditions` are required.
pub fn validate_alert(req: NewAlert) -> Result<ValidAlert, ServiceError> {
    // ---
    let conditions = req.conditions.filter(|c| !c.is_null());

    let (Some(title), Some(severity), Some(conditions)) =
        (non_blank(req.title), non_blank(req.severity), conditions)
    else {
        return Err(ServiceError::BadRequest(
            "title, severity, and conditions are required".into(),
        ));
    };
    let Value::Object(conditions) = conditions else {
        return Err(ServiceError::BadRequest(
            "conditions must be a JSON object".into(),
        ));
    };
    let severity = severity.parse::<AlertSeverity>()?;

    Ok(ValidAlert {
        title,
        description: non_blank(req.description),
        device_id: non_blank(req.device_id),
        severity,
        conditions,
    })
}

pub async fn list_alerts(
    store: &PgStore,
    params: &AlertQuery,
    default_limit: u32,
) -> Result<Vec<Alert>, ServiceError> {
    // ---
    let filter = alert_filter(params, default_limit)?;
    debug!("Listing alerts with {:?}", filter);
    Ok(store.list_alerts(filter).await?)
}

/// Validate and open a new alert. A given `device_id` must be registered.
pub async fn open_alert(store: &PgStore, req: NewAlert) -> Result<Alert, ServiceError> {
    // ---
    let valid = validate_alert(req)?;

    let device = match valid.device_id.as_deref() {
        Some(device_id) => Some(
            store
                .resolve_device(device_id)
                .await?
                .ok_or(ServiceError::DeviceNotFound)?,
        ),
        None => None,
    };

    let alert = store
        .insert_alert(
            device,
            &valid.title,
            valid.description.as_deref(),
            valid.severity,
            &valid.conditions,
        )
        .await?;

    info!("Opened {} alert {} ({})", alert.severity, alert.id, alert.title);
    Ok(alert)
}

pub async fn resolve_alert(store: &PgStore, id: Uuid) -> Result<Alert, ServiceError> {
    // ---
    let alert = store
        .resolve_alert(id)
        .await?
        .ok_or(ServiceError::AlertNotFound)?;

    info!("Resolved alert {}", alert.id);
    Ok(alert)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> NewAlert {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_valid_alert_trims_and_keeps_optional_fields() {
        // ---
        let valid = validate_alert(request(json!({
            "title": " Overheating ",
            "severity": "high",
            "device_id": "thermo-1",
            "description": "",
            "conditions": { "field": "temp", "op": ">", "value": 40 }
        })))
        .unwrap();

        assert_eq!(valid.title, "Overheating");
        assert_eq!(valid.severity, AlertSeverity::High);
        assert_eq!(valid.device_id.as_deref(), Some("thermo-1"));
        assert_eq!(valid.description, None);
        assert_eq!(valid.conditions["value"], json!(40));
    }

    #[test]
    fn test_alert_without_device_is_allowed() {
        // ---
        let valid = validate_alert(request(json!({
            "title": "Backlog growing",
            "severity": "low",
            "conditions": {}
        })))
        .unwrap();
        assert_eq!(valid.device_id, None);
    }

    #[test]
    fn test_missing_or_malformed_alert_fields_rejected() {
        // ---
        for body in [
            json!({ "severity": "low", "conditions": {} }),
            json!({ "title": "t", "conditions": {} }),
            json!({ "title": "t", "severity": "low" }),
            json!({ "title": "t", "severity": "low", "conditions": null }),
            json!({ "title": " ", "severity": "low", "conditions": {} }),
            json!({ "title": "t", "severity": "low", "conditions": "temp > 40" }),
            json!({ "title": "t", "severity": "urgent", "conditions": {} }),
        ] {
            let err = validate_alert(request(body.clone())).unwrap_err();
            assert!(
                matches!(err, ServiceError::BadRequest(_)),
                "expected bad request for {body}"
            );
        }
    }

    #[test]
    fn test_alert_filter_defaults_and_blank_values() {
        // ---
        let filter = alert_filter(&AlertQuery::default(), 50).unwrap();
        assert_eq!(
            filter,
            AlertFilter {
                status: None,
                severity: None,
                limit: 50
            }
        );

        let params = AlertQuery {
            status: Some("".into()),
            severity: Some("critical".into()),
            limit: Some("5".into()),
        };
        let filter = alert_filter(&params, 50).unwrap();
        assert_eq!(filter.status, None);
        assert_eq!(filter.severity, Some(AlertSeverity::Critical));
        assert_eq!(filter.limit, 5);

        let params = AlertQuery {
            status: Some("closed".into()),
            ..Default::default()
        };
        assert!(matches!(
            alert_filter(&params, 50),
            Err(ServiceError::BadRequest(_))
        ));
    }
}
