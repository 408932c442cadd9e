//! CSV rendering for `/api/data/export`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::query::distinct_fields;
use crate::Reading;

// ---

/// Render readings as CSV.
///
/// Columns are `timestamp` followed by the sorted union of field names
/// across all readings. Missing and null values are empty cells.
pub fn readings_to_csv(readings: &[Reading]) -> String {
    // ---
    let fields = distinct_fields(readings);

    let mut csv = String::new();
    csv.push_str("timestamp");
    for field in &fields {
        csv.push(',');
        csv.push_str(&escape_cell(field));
    }
    csv.push('\n');

    for reading in readings {
        csv.push_str(&reading.time.to_rfc3339_opts(SecondsFormat::Millis, true));
        for field in &fields {
            csv.push(',');
            csv.push_str(&format_cell(reading.data.get(field)));
        }
        csv.push('\n');
    }

    csv
}

/// `iot-data-<device>-<YYYY-MM-DD>.csv`
pub fn export_filename(device_id: &str, today: DateTime<Utc>) -> String {
    // ---
    let safe: String = device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("iot-data-{}-{}.csv", safe, today.format("%Y-%m-%d"))
}

fn format_cell(value: Option<&Value>) -> String {
    // ---
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => escape_cell(s),
        Some(other) => escape_cell(&other.to_string()),
    }
}

fn escape_cell(raw: &str) -> String {
    // ---
    if raw.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
