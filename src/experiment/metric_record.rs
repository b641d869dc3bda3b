//! Metric Record - time-series metrics for runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric Record represents a single metric data point.
///
/// Points for one `run_id` + `key` form an append-only series. The `step`
/// orders the series; `timestamp` records wall-clock time of the write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    #[serde(with = "metric_value")]
    value: f64,
    timestamp: DateTime<Utc>,
}

/// JSON has no NaN or infinity, so non-finite values travel as strings.
mod metric_value {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(de::Error::custom(format!("invalid metric value {other:?}"))),
            },
        }
    }
}

impl MetricRecord {
    /// Create a new metric record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `key` - Metric name/key (e.g., "rmse", "train-rmse")
    /// * `step` - Boosting round, epoch, or other sequence number
    /// * `value` - Metric value
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new("run-1", "rmse", 0, 12_345.6);
        assert_eq!(metric.run_id(), "run-1");
        assert_eq!(metric.key(), "rmse");
        assert_eq!(metric.step(), 0);
        assert!((metric.value() - 12_345.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metric_record_json_line() {
        let metric = MetricRecord::new("run-1", "r2", 4, 0.87);
        let line = serde_json::to_string(&metric).unwrap();
        assert!(!line.contains('\n'));
        let back: MetricRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn test_non_finite_values_survive_json() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let metric = MetricRecord::new("run-1", "train-rmse", 0, value);
            let back: MetricRecord =
                serde_json::from_str(&serde_json::to_string(&metric).unwrap()).unwrap();
            assert_eq!(back.value().is_nan(), value.is_nan());
            if !value.is_nan() {
                assert_eq!(back.value().to_bits(), value.to_bits());
            }
        }
    }
}
