//! Epoch-aligned bucketing of readings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::DEFAULT_INTERVAL_MS;
use crate::Reading;

// ---

/// Readings that share one bucket, in input order.
#[derive(Debug)]
pub struct Bucket<'a> {
    // ---
    /// Bucket start in epoch milliseconds.
    pub start_ms: i64,
    pub readings: Vec<&'a Reading>,
}

impl Bucket<'_> {
    // ---
    /// Bucket start as a timestamp.
    ///
    /// Flooring a pre-epoch reading with a very wide interval can land before
    /// the earliest representable instant; such a start is clamped to
    /// [`DateTime::MIN_UTC`].
    pub fn start(&self) -> DateTime<Utc> {
        // ---
        DateTime::from_timestamp_millis(self.start_ms).unwrap_or_else(|| {
            debug!(
                "Bucket start {} ms is out of range, clamping to {}",
                self.start_ms,
                DateTime::<Utc>::MIN_UTC
            );
            DateTime::<Utc>::MIN_UTC
        })
    }
}

/// Start of the bucket containing `timestamp`, in epoch milliseconds.
///
/// Buckets are aligned to the Unix epoch, not to the first reading, and are
/// half-open: a timestamp exactly on a boundary starts a new bucket.
pub fn bucket_start(timestamp: DateTime<Utc>, interval_ms: i64) -> i64 {
    // ---
    timestamp.timestamp_millis().div_euclid(interval_ms) * interval_ms
}

/// Group readings by bucket start.
///
/// Buckets come back in first-seen order and each keeps its readings in
/// input order; nothing is re-sorted. Only populated buckets exist.
/// A non-positive `interval_ms` is replaced by [`DEFAULT_INTERVAL_MS`].
pub fn group_by_bucket(readings: &[Reading], interval_ms: i64) -> Vec<Bucket<'_>> {
    // ---
    let width = if interval_ms > 0 {
        interval_ms
    } else {
        DEFAULT_INTERVAL_MS
    };

    let mut buckets: Vec<Bucket<'_>> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for reading in readings {
        let start_ms = bucket_start(reading.time, width);
        let slot = *index.entry(start_ms).or_insert_with(|| {
            buckets.push(Bucket {
                start_ms,
                readings: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].readings.push(reading);
    }

    buckets
}
