//! Time-bucket aggregation of device readings.
//!
//! Readings are grouped into fixed-width, epoch-aligned buckets and each
//! bucket's fields are reduced with one aggregation function. The engine is
//! pure: it borrows the readings it is given and returns freshly built
//! points, so concurrent requests never share state.
//!
//! Stages, one sibling module each:
//! - `interval` – "5m" / "1h" / "1d" to a width in milliseconds
//! - `bucket`   – grouping readings by bucket start
//! - `reduce`   – per-field numeric reduction within a bucket
//!
//! Malformed input degrades permissively by default (unknown interval units
//! fall back to one minute, unknown functions to the last value). An
//! [`AggregationPolicy`] with `strict` set turns those fallbacks into errors.

use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::Reading;

mod bucket;
mod interval;
mod reduce;

pub use bucket::group_by_bucket;
pub use interval::{parse_interval, try_parse_interval, DEFAULT_INTERVAL_MS};
pub use reduce::reduce_fields;

// ---

/// Errors raised only when the aggregation policy is strict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    // ---
    #[error("unknown aggregation function '{0}' (expected avg, sum, min, max, count or last)")]
    UnknownFunction(String),

    #[error("invalid interval '{0}' (expected <n>m, <n>h or <n>d with n > 0)")]
    InvalidInterval(String),
}

/// Reduction applied to the numeric values of a field within one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationFn {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    /// Last numeric value in input order.
    Last,
}

impl AggregationFn {
    // ---
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationFn::Avg => "avg",
            AggregationFn::Sum => "sum",
            AggregationFn::Min => "min",
            AggregationFn::Max => "max",
            AggregationFn::Count => "count",
            AggregationFn::Last => "last",
        }
    }
}

impl fmt::Display for AggregationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationFn {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "avg" => Ok(AggregationFn::Avg),
            "sum" => Ok(AggregationFn::Sum),
            "min" => Ok(AggregationFn::Min),
            "max" => Ok(AggregationFn::Max),
            "count" => Ok(AggregationFn::Count),
            "last" => Ok(AggregationFn::Last),
            other => Err(AggregationError::UnknownFunction(other.to_string())),
        }
    }
}

/// Which field names a bucket reduces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// Only the fields of the bucket's first reading; later extras are dropped.
    #[default]
    FirstReading,
    /// Every field seen in any reading of the bucket.
    Union,
}

impl FromStr for FieldSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s {
            "first" => Ok(FieldSelection::FirstReading),
            "union" => Ok(FieldSelection::Union),
            other => Err(format!("expected 'first' or 'union', got '{other}'")),
        }
    }
}

/// How the engine treats input it cannot interpret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationPolicy {
    // ---
    /// Reject unknown functions and malformed intervals instead of falling back.
    pub strict: bool,

    pub fields: FieldSelection,
}

impl AggregationPolicy {
    // ---
    pub fn resolve_function(&self, name: &str) -> Result<AggregationFn, AggregationError> {
        // ---
        match name.parse::<AggregationFn>() {
            Ok(func) => Ok(func),
            Err(e) if self.strict => Err(e),
            Err(_) => Ok(AggregationFn::Last),
        }
    }

    pub fn resolve_interval(&self, spec: &str) -> Result<i64, AggregationError> {
        // ---
        if self.strict {
            try_parse_interval(spec)
        } else {
            Ok(parse_interval(spec))
        }
    }
}

/// One output row: the reduced fields of a single populated bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPoint {
    // ---
    /// Bucket start.
    #[serde(serialize_with = "serialize_iso_millis")]
    pub time: DateTime<Utc>,

    pub data: Map<String, Value>,

    /// Number of readings folded into this bucket.
    pub count: usize,
}

fn serialize_iso_millis<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Aggregate `readings` by name, resolving `aggregation` and `interval`
/// through `policy`.
///
/// Empty input short-circuits to an empty result before anything is parsed,
/// so even a strict policy accepts any arguments when there is no data.
pub fn aggregate(
    readings: &[Reading],
    aggregation: &str,
    interval: &str,
    policy: &AggregationPolicy,
) -> Result<Vec<AggregatedPoint>, AggregationError> {
    // ---
    if readings.is_empty() {
        return Ok(Vec::new());
    }

    let func = policy.resolve_function(aggregation)?;
    let interval_ms = policy.resolve_interval(interval)?;

    tracing::debug!(
        "Aggregating {} readings with {} over {} ms buckets",
        readings.len(),
        func,
        interval_ms
    );

    Ok(aggregate_buckets(readings, func, interval_ms, policy.fields))
}

/// Group, reduce and emit one point per populated bucket, ascending by time.
pub fn aggregate_buckets(
    readings: &[Reading],
    func: AggregationFn,
    interval_ms: i64,
    fields: FieldSelection,
) -> Vec<AggregatedPoint> {
    // ---
    let mut points: Vec<AggregatedPoint> = group_by_bucket(readings, interval_ms)
        .into_iter()
        .map(|bucket| AggregatedPoint {
            time: bucket.start(),
            data: reduce_fields(&bucket.readings, func, fields),
            count: bucket.readings.len(),
        })
        .collect();

    points.sort_by_key(|p| p.time);
    points
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn reading_at(h: u32, m: u32, s: u32, data: Value) -> Reading {
        // ---
        Reading {
            time: Utc.with_ymd_and_hms(2025, 3, 26, h, m, s).unwrap(),
            data: data.as_object().cloned().unwrap(),
            metadata: Map::new(),
        }
    }

    /// Descending by time, as the row source returns them.
    fn sample_readings() -> Vec<Reading> {
        // ---
        vec![
            reading_at(10, 14, 0, json!({ "v": 7 })),
            reading_at(10, 11, 0, json!({ "v": 5 })),
            reading_at(10, 9, 59, json!({ "v": 4 })),
            reading_at(10, 5, 0, json!({ "v": 3 })),
            reading_at(10, 0, 30, json!({ "v": 1 })),
        ]
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        // ---
        let strict = AggregationPolicy {
            strict: true,
            ..Default::default()
        };
        for func in ["avg", "sum", "min", "max", "count", "bogus"] {
            for interval in ["5m", "1h", "", "5x"] {
                assert!(aggregate(&[], func, interval, &AggregationPolicy::default())
                    .unwrap()
                    .is_empty());
                assert!(aggregate(&[], func, interval, &strict).unwrap().is_empty());
            }
        }
    }

    #[test]
    fn test_points_sorted_ascending_with_full_coverage() {
        // ---
        let readings = sample_readings();
        let points = aggregate(&readings, "sum", "5m", &AggregationPolicy::default()).unwrap();

        let times: Vec<_> = points.iter().map(|p| p.time).collect();
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2025, 3, 26, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 26, 10, 5, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 26, 10, 10, 0).unwrap(),
            ]
        );

        let total: usize = points.iter().map(|p| p.count).sum();
        assert_eq!(total, readings.len());

        // 10:05:00 and 10:09:59 share a bucket, 10:10:00+ starts the next
        assert_eq!(points[1].data["v"], json!(7));
        assert_eq!(points[1].count, 2);
        assert_eq!(points[2].data["v"], json!(12));
    }

    #[test]
    fn test_numeric_reductions_over_one_bucket() {
        // ---
        let readings = vec![
            reading_at(10, 0, 0, json!({ "v": 10 })),
            reading_at(10, 0, 10, json!({ "v": 20 })),
            reading_at(10, 0, 20, json!({ "v": 30 })),
        ];
        let policy = AggregationPolicy::default();

        let single = |func: &str| {
            let points = aggregate(&readings, func, "1m", &policy).unwrap();
            assert_eq!(points.len(), 1);
            assert_eq!(points[0].count, 3);
            points[0].data["v"].clone()
        };

        assert_eq!(single("avg"), json!(20));
        assert_eq!(single("sum"), json!(60));
        assert_eq!(single("min"), json!(10));
        assert_eq!(single("max"), json!(30));
        assert_eq!(single("count"), json!(3));
        assert_eq!(single("last"), json!(30));
    }

    #[test]
    fn test_single_reading_bucket_returns_own_values() {
        // ---
        let readings = vec![reading_at(10, 0, 0, json!({ "v": 12.5, "state": "ok" }))];
        let policy = AggregationPolicy::default();

        for func in ["avg", "sum", "min", "max", "last"] {
            let points = aggregate(&readings, func, "1h", &policy).unwrap();
            assert_eq!(points[0].data["v"], json!(12.5), "func {func}");
            assert_eq!(points[0].data["state"], json!("ok"), "func {func}");
            assert_eq!(points[0].count, 1);
        }

        let counted = aggregate(&readings, "count", "1h", &policy).unwrap();
        assert_eq!(counted[0].data["v"], json!(1));
    }

    #[test]
    fn test_unknown_function_falls_back_to_last_value() {
        // ---
        let readings = vec![
            reading_at(10, 0, 0, json!({ "v": 1 })),
            reading_at(10, 0, 30, json!({ "v": 9 })),
        ];
        let points = aggregate(&readings, "median", "1m", &AggregationPolicy::default()).unwrap();
        assert_eq!(points[0].data["v"], json!(9));
    }

    #[test]
    fn test_strict_policy_rejects_fallbacks() {
        // ---
        let readings = sample_readings();
        let strict = AggregationPolicy {
            strict: true,
            ..Default::default()
        };

        assert_eq!(
            aggregate(&readings, "median", "5m", &strict),
            Err(AggregationError::UnknownFunction("median".into()))
        );
        assert_eq!(
            aggregate(&readings, "avg", "5x", &strict),
            Err(AggregationError::InvalidInterval("5x".into()))
        );
        assert!(aggregate(&readings, "avg", "5m", &strict).is_ok());
    }

    #[test]
    fn test_union_field_selection_keeps_late_fields() {
        // ---
        let readings = vec![
            reading_at(10, 0, 0, json!({ "a": 1 })),
            reading_at(10, 0, 30, json!({ "a": 2, "b": 99 })),
        ];

        let first = aggregate(&readings, "sum", "1m", &AggregationPolicy::default()).unwrap();
        assert_eq!(first[0].data, json!({ "a": 3 }).as_object().cloned().unwrap());

        let union = AggregationPolicy {
            fields: FieldSelection::Union,
            ..Default::default()
        };
        let points = aggregate(&readings, "sum", "1m", &union).unwrap();
        assert_eq!(points[0].data["a"], json!(3));
        assert_eq!(points[0].data["b"], json!(99));
    }

    #[test]
    fn test_point_serializes_with_millisecond_iso_time() {
        // ---
        let readings = vec![reading_at(10, 7, 42, json!({ "v": 2 }))];
        let points = aggregate(&readings, "avg", "5m", &AggregationPolicy::default()).unwrap();

        let wire = serde_json::to_value(&points[0]).unwrap();
        assert_eq!(
            wire,
            json!({ "time": "2025-03-26T10:05:00.000Z", "data": { "v": 2 }, "count": 1 })
        );
    }

    #[test]
    fn test_function_names_round_trip() {
        // ---
        for func in [
            AggregationFn::Avg,
            AggregationFn::Sum,
            AggregationFn::Min,
            AggregationFn::Max,
            AggregationFn::Count,
            AggregationFn::Last,
        ] {
            assert_eq!(func.as_str().parse::<AggregationFn>(), Ok(func));
        }
        assert!("AVG".parse::<AggregationFn>().is_err());
    }

    #[test]
    fn test_field_selection_from_str() {
        // ---
        assert_eq!("first".parse::<FieldSelection>(), Ok(FieldSelection::FirstReading));
        assert_eq!("union".parse::<FieldSelection>(), Ok(FieldSelection::Union));
        assert!("all".parse::<FieldSelection>().is_err());
    }
}
