//! Read-side pipeline: resolve a device, fetch its readings from a
//! [`RowSource`], and optionally aggregate them into time buckets.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{RowSource, TimeRange};
use crate::{aggregate, parse_timestamp, AggregatedPoint, AggregationPolicy, Reading, ServiceError};

/// How many recent readings are sampled to discover a device's field names.
const FIELD_SAMPLE_SIZE: u32 = 10;

// ---

/// Query parameters shared by `/api/data/query` and `/api/data/export`.
#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    // ---
    pub device_id: Option<String>,
    /// Inclusive lower bound (ISO-8601).
    pub start_time: Option<String>,
    /// Inclusive upper bound (ISO-8601).
    pub end_time: Option<String>,
    /// Row cap; blank or `0` means the endpoint default.
    pub limit: Option<String>,
    /// `avg`, `sum`, `min`, `max`, `count` (or `last`).
    pub aggregation: Option<String>,
    /// `<n>m`, `<n>h` or `<n>d`.
    pub interval: Option<String>,
}

/// Response body: raw readings or aggregated points, with the item count.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    // ---
    pub data: QueryData,
    /// Number of items in `data`, not the number of readings fetched.
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryData {
    Raw(Vec<Reading>),
    Aggregated(Vec<AggregatedPoint>),
}

#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub fields: Vec<String>,
}

/// Run a data query.
///
/// Aggregation happens only when both `aggregation` and `interval` are given
/// (blank counts as absent) and at least one reading was found; otherwise the
/// readings pass through untouched.
pub async fn run_query<S: RowSource>(
    source: &S,
    params: &DataQuery,
    default_limit: u32,
    policy: &AggregationPolicy,
) -> Result<QueryResponse, ServiceError> {
    // ---
    let readings = fetch_for_query(source, params, default_limit).await?;

    let aggregation = non_blank(params.aggregation.as_deref());
    let interval = non_blank(params.interval.as_deref());

    let response = match (aggregation, interval) {
        (Some(aggregation), Some(interval)) if !readings.is_empty() => {
            let points = aggregate(&readings, aggregation, interval, policy)?;
            info!(
                "Aggregated {} readings into {} points ({}, {})",
                readings.len(),
                points.len(),
                aggregation,
                interval
            );
            QueryResponse {
                count: points.len(),
                data: QueryData::Aggregated(points),
            }
        }
        _ => QueryResponse {
            count: readings.len(),
            data: QueryData::Raw(readings),
        },
    };

    Ok(response)
}

/// Resolve the device and fetch its readings within the requested window.
pub async fn fetch_for_query<S: RowSource>(
    source: &S,
    params: &DataQuery,
    default_limit: u32,
) -> Result<Vec<Reading>, ServiceError> {
    // ---
    let device_id = required_device_id(params.device_id.as_deref())?;
    let range = TimeRange {
        start: parse_bound("start_time", params.start_time.as_deref())?,
        end: parse_bound("end_time", params.end_time.as_deref())?,
    };
    let limit = parse_limit(params.limit.as_deref(), default_limit)?;

    let device = source
        .resolve_device(device_id)
        .await?
        .ok_or(ServiceError::DeviceNotFound)?;

    debug!(
        "Fetching up to {} readings for {} in {:?}",
        limit, device_id, range
    );
    Ok(source.fetch_readings(device, range, limit).await?)
}

/// Sorted, distinct field names seen in the device's most recent readings.
pub async fn list_fields<S: RowSource>(
    source: &S,
    device_id: Option<&str>,
) -> Result<Vec<String>, ServiceError> {
    // ---
    let device_id = required_device_id(device_id)?;
    let device = source
        .resolve_device(device_id)
        .await?
        .ok_or(ServiceError::DeviceNotFound)?;

    let readings = source
        .fetch_readings(device, TimeRange::default(), FIELD_SAMPLE_SIZE)
        .await?;

    Ok(distinct_fields(&readings))
}

/// Union of all field names across `readings`, sorted.
pub fn distinct_fields(readings: &[Reading]) -> Vec<String> {
    // ---
    readings
        .iter()
        .flat_map(|r| r.data.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn required_device_id(device_id: Option<&str>) -> Result<&str, ServiceError> {
    // ---
    match device_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ServiceError::BadRequest("device_id is required".into())),
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.trim().is_empty())
}

/// Blank, absent or `0` falls back to `default_limit`.
pub(crate) fn parse_limit(raw: Option<&str>, default_limit: u32) -> Result<u32, ServiceError> {
    // ---
    match non_blank(raw) {
        None => Ok(default_limit),
        Some(s) => match s.trim().parse::<u32>() {
            Ok(0) => Ok(default_limit),
            Ok(limit) => Ok(limit),
            Err(_) => Err(ServiceError::BadRequest(format!("Invalid limit: {s}"))),
        },
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ServiceError> {
    // ---
    match non_blank(raw) {
        None => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| ServiceError::BadRequest(format!("Invalid {name}: {s}"))),
    }
}
