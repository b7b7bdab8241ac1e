use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::subsystem::Subsystem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n:.2}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Count,
    Seconds,
    Hours,
    Percent,
    Ratio,
    Flag,
}

impl Unit {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Count | Self::Flag => "",
            Self::Seconds => "s",
            Self::Hours => "h",
            Self::Percent => "%",
            Self::Ratio => "x",
        }
    }
}

/// Normalized measurement produced from one raw source response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub unit: Unit,
    pub subsystem: Subsystem,
    /// Id of the source the metric came from.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Identifies the measured object (shard, member, namespace, index).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Set when the inputs were inconsistent and the value was adjusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<String>,
}

impl Metric {
    pub fn number(
        name: impl Into<String>,
        value: f64,
        unit: Unit,
        subsystem: Subsystem,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Number(value),
            unit,
            subsystem,
            source: source.into(),
            timestamp,
            labels: BTreeMap::new(),
            anomaly: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_anomaly(mut self, anomaly: impl Into<String>) -> Self {
        self.anomaly = Some(anomaly.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// `k=v` pairs joined by spaces, in key order.
    pub fn label_string(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_render_without_decimals() {
        assert_eq!(MetricValue::Number(120.0).to_string(), "120");
        assert_eq!(MetricValue::Number(2.5).to_string(), "2.50");
        assert_eq!(MetricValue::Text("full".into()).to_string(), "full");
    }

    #[test]
    fn labels_render_in_key_order() {
        let m = Metric::number("x", 1.0, Unit::Count, Subsystem::Sharding, "s", Utc::now())
            .with_label("shard", "s1")
            .with_label("namespace", "social.posts");
        assert_eq!(m.label_string(), "namespace=social.posts shard=s1");
    }
}
