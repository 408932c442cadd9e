//! Postgres access for devices, readings and alerts.
//!
//! The query service only needs the narrow [`RowSource`] view (resolve a
//! device, fetch its readings), which keeps it testable against in-memory
//! data. Registry and ingest writes are plain methods on [`PgStore`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{Alert, AlertSeverity, AlertStatus, Device, DeviceStatus, Reading};

// ---

/// Optional, inclusive time bounds for a readings fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    // ---
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Supplier of readings for one device.
pub trait RowSource {
    // ---
    /// Map a public device identifier to its internal key.
    fn resolve_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<Uuid>, sqlx::Error>> + Send;

    /// Readings for `device` within `range`, most recent first, at most `limit`.
    fn fetch_readings(
        &self,
        device: Uuid,
        range: TimeRange,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Reading>, sqlx::Error>> + Send;
}

/// Postgres-backed store shared by all handlers.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    time: DateTime<Utc>,
    data: Json<Map<String, Value>>,
    metadata: Json<Map<String, Value>>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            time: row.time,
            data: row.data.0,
            metadata: row.metadata.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: Uuid,
    device_id: String,
    name: String,
    location: Option<String>,
    status: String,
    metadata: Json<Map<String, Value>>,
    last_seen: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            device_id: row.device_id,
            name: row.name,
            location: row.location,
            status: row.status,
            metadata: row.metadata.0,
            last_seen: row.last_seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    device_id: Option<String>,
    device_name: Option<String>,
    device_location: Option<String>,
    title: String,
    description: Option<String>,
    severity: String,
    status: String,
    conditions: Json<Map<String, Value>>,
    triggered_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<AlertRow> for Alert {
    fn from(row: AlertRow) -> Self {
        Alert {
            id: row.id,
            device_id: row.device_id,
            device_name: row.device_name,
            device_location: row.device_location,
            title: row.title,
            description: row.description,
            severity: row.severity,
            status: row.status,
            conditions: row.conditions.0,
            triggered_at: row.triggered_at,
            acknowledged_at: row.acknowledged_at,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        }
    }
}

/// Filters for [`PgStore::list_alerts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertFilter {
    // ---
    pub status: Option<AlertStatus>,
    pub severity: Option<AlertSeverity>,
    pub limit: u32,
}

const DEVICE_COLUMNS: &str =
    "id, device_id, name, location, status, metadata, last_seen, created_at, updated_at";

/// Alert columns joined with the owning device (`alerts a LEFT JOIN devices d`).
const ALERT_COLUMNS: &str = "a.id, d.device_id, d.name AS device_name, \
     d.location AS device_location, a.title, a.description, a.severity, a.status, \
     a.conditions, a.triggered_at, a.acknowledged_at, a.resolved_at, a.created_at";

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All registered devices, newest first.
    pub async fn list_devices(&self) -> Result<Vec<Device>, sqlx::Error> {
        // ---
        let rows: Vec<DeviceRow> = sqlx::query_as(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Device::from).collect())
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<Device>, sqlx::Error> {
        // ---
        let row: Option<DeviceRow> = sqlx::query_as(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = $1"
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Device::from))
    }

    /// Insert a device. A duplicate `device_id` surfaces as a unique violation.
    pub async fn create_device(
        &self,
        device_id: &str,
        name: &str,
        location: Option<&str>,
        status: DeviceStatus,
        metadata: &Map<String, Value>,
    ) -> Result<Device, sqlx::Error> {
        // ---
        let row: DeviceRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO devices (id, device_id, name, location, status, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(device_id)
        .bind(name)
        .bind(location)
        .bind(status.as_str())
        .bind(Json(metadata))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Apply the given changes; `None` arguments leave the column untouched.
    /// Returns `None` when no such device exists.
    pub async fn update_device(
        &self,
        device_id: &str,
        name: Option<&str>,
        location: Option<&str>,
        status: Option<DeviceStatus>,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<Option<Device>, sqlx::Error> {
        // ---
        let row: Option<DeviceRow> = sqlx::query_as(&format!(
            r#"
            UPDATE devices
               SET name       = COALESCE($2, name),
                   location   = COALESCE($3, location),
                   status     = COALESCE($4, status),
                   metadata   = COALESCE($5, metadata),
                   updated_at = NOW()
             WHERE device_id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(device_id)
        .bind(name)
        .bind(location)
        .bind(status.map(|s| s.as_str()))
        .bind(metadata.map(Json))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Device::from))
    }

    /// Delete a device and, through the foreign keys, its readings.
    /// Returns `false` when no such device exists.
    pub async fn delete_device(&self, device_id: &str) -> Result<bool, sqlx::Error> {
        // ---
        let result = sqlx::query("DELETE FROM devices WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Alerts matching `filter`, most recently triggered first.
    pub async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<Alert>, sqlx::Error> {
        // ---
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
              FROM alerts a
              LEFT JOIN devices d ON d.id = a.device_id
             WHERE ($1::text IS NULL OR a.status = $1)
               AND ($2::text IS NULL OR a.severity = $2)
             ORDER BY a.triggered_at DESC
             LIMIT $3
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.severity.map(|s| s.as_str()))
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Alert::from).collect())
    }

    /// Open a new alert, optionally tied to the device with internal key `device`.
    pub async fn insert_alert(
        &self,
        device: Option<Uuid>,
        title: &str,
        description: Option<&str>,
        severity: AlertSeverity,
        conditions: &Map<String, Value>,
    ) -> Result<Alert, sqlx::Error> {
        // ---
        let row: AlertRow = sqlx::query_as(&format!(
            r#"
            WITH a AS (
                INSERT INTO alerts (id, device_id, title, description, severity, status, conditions)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            SELECT {ALERT_COLUMNS}
              FROM a
              LEFT JOIN devices d ON d.id = a.device_id
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(device)
        .bind(title)
        .bind(description)
        .bind(severity.as_str())
        .bind(AlertStatus::Open.as_str())
        .bind(Json(conditions))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Mark an alert resolved now. Returns `None` when no such alert exists.
    pub async fn resolve_alert(&self, id: Uuid) -> Result<Option<Alert>, sqlx::Error> {
        // ---
        let row: Option<AlertRow> = sqlx::query_as(&format!(
            r#"
            WITH a AS (
                UPDATE alerts
                   SET status = $2, resolved_at = NOW()
                 WHERE id = $1
                RETURNING *
            )
            SELECT {ALERT_COLUMNS}
              FROM a
              LEFT JOIN devices d ON d.id = a.device_id
            "#
        ))
        .bind(id)
        .bind(AlertStatus::Resolved.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Alert::from))
    }

    /// Store one reading and stamp the device's `last_seen`, atomically.
    pub async fn insert_reading(
        &self,
        device: Uuid,
        time: DateTime<Utc>,
        data: &Map<String, Value>,
        metadata: &Map<String, Value>,
    ) -> Result<Reading, sqlx::Error> {
        // ---
        let mut tx = self.pool.begin().await?;

        let row: ReadingRow = sqlx::query_as(
            r#"
            INSERT INTO iot_data (time, device_id, data, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING time, data, metadata
            "#,
        )
        .bind(time)
        .bind(device)
        .bind(Json(data))
        .bind(Json(metadata))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE devices SET last_seen = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(device)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}

impl RowSource for PgStore {
    // ---
    async fn resolve_device(&self, device_id: &str) -> Result<Option<Uuid>, sqlx::Error> {
        // ---
        sqlx::query_scalar("SELECT id FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn fetch_readings(
        &self,
        device: Uuid,
        range: TimeRange,
        limit: u32,
    ) -> Result<Vec<Reading>, sqlx::Error> {
        // ---
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT time, data, metadata
              FROM iot_data
             WHERE device_id = $1
               AND ($2::timestamptz IS NULL OR time >= $2)
               AND ($3::timestamptz IS NULL OR time <= $3)
             ORDER BY time DESC
             LIMIT $4
            "#,
        )
        .bind(device)
        .bind(range.start)
        .bind(range.end)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Fetched {} readings for device {}", rows.len(), device);
        Ok(rows.into_iter().map(Reading::from).collect())
    }
}
