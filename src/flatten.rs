//! Reshapes Prometheus query results into flat, uploadable records.

use serde_json::Value;
use tracing::warn;

use crate::enrichment::Enrichment;
use crate::models::{FlattenedRecord, QueryData, Series, NAME_LABEL};
use crate::{AdapterError, Result};

/// Flattens every series of a query result.
///
/// Vector-shaped series (`value`) yield one record, matrix-shaped series
/// (`values`) one record per sample. Malformed series and samples are
/// logged and skipped; everything else in the envelope is still returned.
pub fn flatten(data: &QueryData, enrichment: &Enrichment) -> Vec<FlattenedRecord> {
    let mut records = Vec::new();

    for raw in &data.result {
        let series: Series = match serde_json::from_value(raw.clone()) {
            Ok(series) => series,
            Err(e) => {
                warn!(error = %e, "skipping malformed series");
                continue;
            }
        };

        let mut labels = series.metric;
        let metric_name = match labels.remove(NAME_LABEL) {
            Some(name) if !name.is_empty() => name,
            _ => {
                warn!(?labels, "skipping series without a metric name");
                continue;
            }
        };

        let samples = series
            .value
            .iter()
            .chain(series.values.iter().flatten());

        for sample in samples {
            match parse_sample(sample) {
                Ok((timestamp, value, raw_value)) => records.push(FlattenedRecord {
                    metric_name: metric_name.clone(),
                    labels: labels.clone(),
                    timestamp,
                    value,
                    raw_value,
                    device_id: enrichment.device_id.clone(),
                    software_version: enrichment.software_version.clone(),
                }),
                Err(e) => {
                    warn!(metric = %metric_name, %sample, error = %e, "skipping malformed sample");
                }
            }
        }
    }

    records
}

/// Parses a `[timestamp, "value"]` pair, keeping the value's original text.
fn parse_sample(sample: &Value) -> Result<(f64, f64, String)> {
    let pair = match sample.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => {
            return Err(AdapterError::Schema(
                "sample is not a [timestamp, value] pair".to_string(),
            ))
        }
    };

    let timestamp = parse_number(&pair[0])
        .filter(|ts| ts.is_finite())
        .ok_or_else(|| AdapterError::Schema(format!("non-numeric timestamp {}", pair[0])))?;
    let value = parse_number(&pair[1])
        .ok_or_else(|| AdapterError::Schema(format!("non-numeric value {}", pair[1])))?;
    let raw_value = match &pair[1] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok((timestamp, value, raw_value))
}

/// Prometheus encodes sample values as strings, including the special
/// values `NaN`, `+Inf` and `-Inf`.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "+Inf" | "Inf" => Some(f64::INFINITY),
            "-Inf" => Some(f64::NEG_INFINITY),
            other => other.trim().parse().ok(),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn enrichment() -> Enrichment {
        Enrichment::new("219", "prometheus_test")
    }

    fn data(value: Value) -> QueryData {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_vector_series_yields_one_record() {
        let data = data(json!({
            "resultType": "vector",
            "result": [{
                "metric": {"__name__": "up", "job": "node", "instance": "robot:9100"},
                "value": [1435781451.5, "1"]
            }]
        }));

        let records = flatten(&data, &enrichment());
        assert_eq!(records.len(), 1);

        let mut labels = BTreeMap::new();
        labels.insert("instance".to_string(), "robot:9100".to_string());
        labels.insert("job".to_string(), "node".to_string());
        assert_eq!(
            records[0],
            FlattenedRecord {
                metric_name: "up".to_string(),
                labels,
                timestamp: 1435781451.5,
                value: 1.0,
                raw_value: "1".to_string(),
                device_id: "219".to_string(),
                software_version: "prometheus_test".to_string(),
            }
        );
    }

    #[test]
    fn test_matrix_series_yields_one_record_per_sample() {
        let data = data(json!({
            "resultType": "matrix",
            "result": [{
                "metric": {"__name__": "battery_level", "robot": "r1"},
                "values": [[1600000000, "98"], [1600000060, "97.5"], [1600000120, "97"]]
            }]
        }));

        let records = flatten(&data, &enrichment());
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            vec![1600000000.0, 1600000060.0, 1600000120.0]
        );
        assert_eq!(
            records.iter().map(|r| r.value).collect::<Vec<_>>(),
            vec![98.0, 97.5, 97.0]
        );
        for record in &records {
            assert_eq!(record.metric_name, "battery_level");
            assert_eq!(record.labels.get("robot").map(String::as_str), Some("r1"));
            assert!(!record.labels.contains_key(NAME_LABEL));
        }
    }

    #[test]
    fn test_multiple_series_are_flattened_in_order() {
        let data = data(json!({
            "resultType": "matrix",
            "result": [
                {"metric": {"__name__": "a"}, "values": [[1, "1"], [2, "2"]]},
                {"metric": {"__name__": "b"}, "values": [[3, "3"]]}
            ]
        }));

        let names: Vec<_> = flatten(&data, &enrichment())
            .into_iter()
            .map(|r| r.metric_name)
            .collect();
        assert_eq!(names, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_special_values() {
        let data = data(json!({
            "resultType": "matrix",
            "result": [{
                "metric": {"__name__": "ratio"},
                "values": [[1, "NaN"], [2, "+Inf"], [3, "-Inf"]]
            }]
        }));

        let records = flatten(&data, &enrichment());
        assert_eq!(records.len(), 3);
        assert!(records[0].value.is_nan());
        assert_eq!(records[1].value, f64::INFINITY);
        assert_eq!(records[2].value, f64::NEG_INFINITY);
        assert!(records.iter().all(|r| r.finite_value().is_none()));
        assert_eq!(
            records.iter().map(|r| r.raw_value.as_str()).collect::<Vec<_>>(),
            vec!["NaN", "+Inf", "-Inf"]
        );
    }

    #[test]
    fn test_string_timestamp_is_accepted() {
        let data = data(json!({
            "result": [{"metric": {"__name__": "up"}, "value": ["1600000000.5", "1"]}]
        }));

        let records = flatten(&data, &enrichment());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 1600000000.5);
    }

    #[test]
    fn test_series_without_name_is_dropped() {
        let data = data(json!({
            "resultType": "vector",
            "result": [
                {"metric": {"job": "node"}, "value": [1, "1"]},
                {"metric": {"__name__": ""}, "value": [1, "1"]},
                {"metric": {"__name__": "up"}, "value": [1, "1"]}
            ]
        }));

        let records = flatten(&data, &enrichment());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metric_name, "up");
    }

    #[test]
    fn test_malformed_samples_are_skipped_individually() {
        let data = data(json!({
            "resultType": "matrix",
            "result": [
                "not a series",
                {
                    "metric": {"__name__": "temp"},
                    "values": [[1, "20"], ["soon", "21"], [3], [4, {"x": 1}], [5, "22"]]
                }
            ]
        }));

        let records = flatten(&data, &enrichment());
        assert_eq!(
            records.iter().map(|r| (r.timestamp, r.value)).collect::<Vec<_>>(),
            vec![(1.0, 20.0), (5.0, 22.0)]
        );
    }

    #[test]
    fn test_empty_result() {
        let data = data(json!({"resultType": "vector", "result": []}));
        assert!(flatten(&data, &enrichment()).is_empty());
    }
}
