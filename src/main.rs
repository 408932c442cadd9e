//! Application entry point for the `iot-telemetry` backend service.
//!
//! Startup sequence:
//! - Load configuration from environment variables or `.env`
//! - Initialize structured logging/tracing
//! - Open the PostgreSQL connection pool
//! - Create the `devices` / `iot_data` / `alerts` schema if it does not exist
//! - Mount all API routes via the `routes` gateway (EMBP pattern)
//! - Bind the Axum HTTP server and serve requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `DB_POOL_MAX`, `BIND_ADDR`, `QUERY_DEFAULT_LIMIT`, `EXPORT_DEFAULT_LIMIT`,
//!   `ALERT_DEFAULT_LIMIT`, `AGGREGATION_STRICT`, `AGGREGATION_FIELDS` – see
//!   [`config::load_from_env`]
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Modules only talk to each other through the re-exports below, so
//! `routes/*.rs` depend on their parent module rather than on siblings.
use std::{env, io::IsTerminal};

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod aggregation;
mod alerts;
mod config;
mod error;
mod export;
mod ingest;
mod models;
mod query;
mod routes;
mod schema;
mod store;

pub use aggregation::{
    aggregate, AggregatedPoint, AggregationError, AggregationPolicy, FieldSelection,
};
pub use alerts::{list_alerts, open_alert, resolve_alert, AlertQuery};
pub use config::Config;
pub use error::ServiceError;
pub use export::{export_filename, readings_to_csv};
pub use ingest::ingest;
pub use models::{
    parse_timestamp, Alert, AlertSeverity, AlertStatus, Device, DeviceStatus, DeviceUpdate,
    IngestRequest, NewAlert, NewDevice, Reading,
};
pub use query::{fetch_for_query, list_fields, run_query, DataQuery, FieldsResponse};
pub use store::PgStore;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let addr = cfg.bind_addr;

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(pool, cfg);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Install the global tracing subscriber.
///
/// - Target, file and line number are always printed
/// - `FORCE_COLOR=1|true|yes` forces ANSI colors, `0|false|no` disables them,
///   anything else auto-detects a TTY on stdout
/// - `AXUM_SPAN_EVENTS=full` emits ENTER/EXIT/CLOSE, `enter_exit` ENTER/EXIT,
///   default CLOSE only
/// - `RUST_LOG` wins when set; otherwise `AXUM_LOG_LEVEL` (default `debug`)
///   with `sqlx::query` held at `warn`
///
/// Call once, before the first log line.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => level.to_string(),
            _ => "debug".to_string(),
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
