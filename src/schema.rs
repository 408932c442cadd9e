//! Database schema management for `iot-telemetry`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `devices` registry, the `iot_data` readings table and the
/// `alerts` table. Safe to call on every startup; no-op if objects already
/// exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Device registry, addressed publicly by `device_id`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id          UUID        PRIMARY KEY,
            device_id   TEXT        NOT NULL UNIQUE,
            name        TEXT        NOT NULL,
            location    TEXT,
            status      TEXT        NOT NULL DEFAULT 'active'
                        CHECK (status IN ('active', 'inactive', 'maintenance', 'error')),
            metadata    JSONB       NOT NULL DEFAULT '{}'::jsonb,
            last_seen   TIMESTAMPTZ,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Schema-agnostic readings served by `/api/data/query`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS iot_data (
            time        TIMESTAMPTZ NOT NULL,
            device_id   UUID        NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
            data        JSONB       NOT NULL,
            metadata    JSONB       NOT NULL DEFAULT '{}'::jsonb,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Every read is "one device, newest first"
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_iot_data_device_time
            ON iot_data (device_id, time DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Alerts outlive the device they point at
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id              UUID        PRIMARY KEY,
            device_id       UUID        REFERENCES devices (id) ON DELETE SET NULL,
            title           TEXT        NOT NULL,
            description     TEXT,
            severity        TEXT        NOT NULL
                            CHECK (severity IN ('low', 'medium', 'high', 'critical')),
            status          TEXT        NOT NULL DEFAULT 'open'
                            CHECK (status IN ('open', 'acknowledged', 'resolved')),
            conditions      JSONB       NOT NULL DEFAULT '{}'::jsonb,
            triggered_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            acknowledged_at TIMESTAMPTZ,
            resolved_at     TIMESTAMPTZ,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_triggered
            ON alerts (triggered_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
