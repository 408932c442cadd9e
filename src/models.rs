//! Data models for devices, their telemetry readings and alerts.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ServiceError;

// ---

/// One ingested observation for a device.
///
/// `data` is schema-agnostic: field sets may differ between readings of the
/// same device, and values may be any JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub time: DateTime<Utc>,
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A registered device as stored in the `devices` table.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    // ---
    pub id: Uuid,
    pub device_id: String,
    pub name: String,
    pub location: Option<String>,
    pub status: String,
    pub metadata: Map<String, Value>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operational state of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
    Error,
}

impl DeviceStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Maintenance => "maintenance",
            DeviceStatus::Error => "error",
        }
    }
}

/// Request body for `POST /api/devices`.
#[derive(Debug, Deserialize)]
pub struct NewDevice {
    // ---
    pub device_id: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NewDevice {
    // ---
    /// Trimmed `(device_id, name)`, both required and non-empty.
    pub fn required_fields(&self) -> Result<(&str, &str), ServiceError> {
        // ---
        let device_id = self.device_id.as_deref().map(str::trim).unwrap_or_default();
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();

        if device_id.is_empty() || name.is_empty() {
            return Err(ServiceError::BadRequest(
                "device_id and name are required".into(),
            ));
        }
        Ok((device_id, name))
    }
}

/// Request body for `PUT /api/devices/{device_id}`; absent fields are kept.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceUpdate {
    // ---
    pub name: Option<String>,
    pub location: Option<String>,
    pub status: Option<DeviceStatus>,
    pub metadata: Option<Map<String, Value>>,
}

impl DeviceUpdate {
    // ---
    /// Trimmed new name, if one was given. A blank name is rejected.
    pub fn name(&self) -> Result<Option<&str>, ServiceError> {
        // ---
        match self.name.as_deref().map(str::trim) {
            Some("") => Err(ServiceError::BadRequest("name must not be empty".into())),
            other => Ok(other),
        }
    }
}

/// Request body for `POST /api/data/ingest`.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    // ---
    pub device_id: Option<String>,
    pub data: Option<Value>,
    pub timestamp: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// An alert as returned by `/api/alerts`, joined with its device.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    // ---
    pub id: Uuid,
    /// Public identifier of the device the alert concerns, if any.
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub device_location: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub severity: String,
    pub status: String,
    pub conditions: Map<String, Value>,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim() {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(ServiceError::BadRequest(format!(
                "Invalid severity: {other} (expected low, medium, high or critical)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim() {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(ServiceError::BadRequest(format!(
                "Invalid status: {other} (expected open, acknowledged or resolved)"
            ))),
        }
    }
}

/// Request body for `POST /api/alerts`.
#[derive(Debug, Deserialize)]
pub struct NewAlert {
    // ---
    pub title: Option<String>,
    pub description: Option<String>,
    /// Public device identifier; the alert may also stand alone.
    pub device_id: Option<String>,
    pub severity: Option<String>,
    pub conditions: Option<Value>,
}

/// Parse a client-supplied timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00Z`, `2024-05-01T12:00:00+02:00`),
/// zone-less date-times as produced by `datetime-local` inputs
/// (`2024-05-01T10:00`, `2024-05-01T10:00:00`) which are taken as UTC, and
/// bare dates (`2024-05-01`, midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // ---
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
