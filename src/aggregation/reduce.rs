//! Per-field reduction of the readings in one bucket.

use std::collections::BTreeSet;

use serde_json::{Map, Number, Value};

use super::{AggregationFn, FieldSelection};
use crate::Reading;

// ---

/// Reduce each selected field across `readings` with `func`.
///
/// Only numeric values take part in a reduction. A field with no numeric
/// value at all keeps the raw value of the first reading that carries it, so
/// metadata such as a status string passes through unchanged.
pub fn reduce_fields(
    readings: &[&Reading],
    func: AggregationFn,
    selection: FieldSelection,
) -> Map<String, Value> {
    // ---
    let mut result = Map::new();

    for name in field_names(readings, selection) {
        let numeric: Vec<&Value> = readings
            .iter()
            .filter_map(|r| r.data.get(&name))
            .filter(|v| v.is_number())
            .collect();

        let value = if numeric.is_empty() {
            readings
                .iter()
                .find_map(|r| r.data.get(&name))
                .cloned()
                .unwrap_or(Value::Null)
        } else {
            reduce_numeric(&numeric, func)
        };

        result.insert(name, value);
    }

    result
}

fn field_names(readings: &[&Reading], selection: FieldSelection) -> BTreeSet<String> {
    // ---
    match selection {
        FieldSelection::FirstReading => readings
            .first()
            .map(|r| r.data.keys().cloned().collect())
            .unwrap_or_default(),
        FieldSelection::Union => readings
            .iter()
            .flat_map(|r| r.data.keys().cloned())
            .collect(),
    }
}

/// `values` is non-empty and every element is a JSON number.
fn reduce_numeric(values: &[&Value], func: AggregationFn) -> Value {
    // ---
    let floats = || values.iter().filter_map(|v| v.as_f64());

    match func {
        AggregationFn::Avg => number_value(floats().sum::<f64>() / values.len() as f64),
        AggregationFn::Sum => number_value(floats().sum()),
        AggregationFn::Min => number_value(floats().fold(f64::INFINITY, f64::min)),
        AggregationFn::Max => number_value(floats().fold(f64::NEG_INFINITY, f64::max)),
        AggregationFn::Count => Value::from(values.len()),
        AggregationFn::Last => match values.last() {
            Some(v) if v.is_f64() => v.as_f64().map_or(Value::Null, number_value),
            Some(v) => (*v).clone(),
            None => Value::Null,
        },
    }
}

/// Integral results are written as JSON integers (`60`, not `60.0`);
/// non-finite results become `null`.
fn number_value(x: f64) -> Value {
    // ---
    if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Value::from(x as i64)
    } else {
        Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn readings(payloads: &[Value]) -> Vec<Reading> {
        // ---
        payloads
            .iter()
            .enumerate()
            .map(|(i, p)| Reading {
                time: Utc.with_ymd_and_hms(2025, 3, 26, 10, 0, i as u32).unwrap(),
                data: p.as_object().cloned().unwrap(),
                metadata: Map::new(),
            })
            .collect()
    }

    fn reduce(payloads: &[Value], func: AggregationFn) -> Map<String, Value> {
        // ---
        let owned = readings(payloads);
        let refs: Vec<&Reading> = owned.iter().collect();
        reduce_fields(&refs, func, FieldSelection::FirstReading)
    }

    #[test]
    fn test_non_numeric_field_passes_first_value_through() {
        // ---
        let payloads = [json!({ "label": "ok" }), json!({ "label": "fail" })];
        for func in [
            AggregationFn::Avg,
            AggregationFn::Sum,
            AggregationFn::Min,
            AggregationFn::Max,
            AggregationFn::Count,
        ] {
            assert_eq!(reduce(&payloads, func)["label"], json!("ok"));
        }
    }

    #[test]
    fn test_late_fields_ignored_under_first_reading_selection() {
        // ---
        let out = reduce(
            &[json!({ "a": 1 }), json!({ "a": 2, "b": 99 })],
            AggregationFn::Sum,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out["a"], json!(3));
        assert!(!out.contains_key("b"));
    }

    #[test]
    fn test_non_numeric_values_excluded_from_reduction() {
        // ---
        let payloads = [
            json!({ "t": 10, "s": "ok" }),
            json!({ "t": "n/a", "s": 1 }),
            json!({ "t": null }),
            json!({ "t": true }),
            json!({ "t": 20 }),
        ];

        let avg = reduce(&payloads, AggregationFn::Avg);
        assert_eq!(avg["t"], json!(15));
        // "s" has one numeric value, so it is reduced rather than passed through
        assert_eq!(avg["s"], json!(1));

        assert_eq!(reduce(&payloads, AggregationFn::Count)["t"], json!(2));
        assert_eq!(reduce(&payloads, AggregationFn::Last)["t"], json!(20));
    }

    #[test]
    fn test_fractional_and_negative_results() {
        // ---
        let payloads = [json!({ "v": 1 }), json!({ "v": 2 })];
        assert_eq!(reduce(&payloads, AggregationFn::Avg)["v"], json!(1.5));

        let payloads = [json!({ "v": -2.5 }), json!({ "v": 4.25 }), json!({ "v": -7 })];
        assert_eq!(reduce(&payloads, AggregationFn::Min)["v"], json!(-7));
        assert_eq!(reduce(&payloads, AggregationFn::Max)["v"], json!(4.25));
        assert_eq!(reduce(&payloads, AggregationFn::Sum)["v"], json!(-5.25));
    }

    #[test]
    fn test_last_formats_numbers_like_other_reductions() {
        // ---
        let payloads = [json!({ "v": 3 }), json!({ "v": 8.0 })];
        assert_eq!(reduce(&payloads, AggregationFn::Last)["v"], json!(8));
        assert_eq!(reduce(&payloads, AggregationFn::Max)["v"], json!(8));

        let payloads = [json!({ "v": 8.0 }), json!({ "v": 2.5 })];
        assert_eq!(reduce(&payloads, AggregationFn::Last)["v"], json!(2.5));

        // integers are kept exactly, even beyond f64 precision
        let payloads = [json!({ "v": u64::MAX })];
        assert_eq!(reduce(&payloads, AggregationFn::Last)["v"], json!(u64::MAX));
    }

    #[test]
    fn test_union_passthrough_uses_first_carrier() {
        // ---
        let owned = readings(&[json!({ "a": 1 }), json!({ "a": 2, "mode": "eco" })]);
        let refs: Vec<&Reading> = owned.iter().collect();

        let out = reduce_fields(&refs, AggregationFn::Max, FieldSelection::Union);
        assert_eq!(out["a"], json!(2));
        assert_eq!(out["mode"], json!("eco"));
    }

    #[test]
    fn test_number_value_overflow_becomes_null() {
        // ---
        assert_eq!(number_value(f64::INFINITY), Value::Null);
        assert_eq!(number_value(f64::NAN), Value::Null);
        assert_eq!(number_value(60.0), json!(60));
    }

    #[test]
    fn test_empty_bucket_reduces_to_nothing() {
        // ---
        assert!(reduce_fields(&[], AggregationFn::Avg, FieldSelection::Union).is_empty());
    }
}
