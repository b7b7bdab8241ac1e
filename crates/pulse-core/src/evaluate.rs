//! Table-driven severity classification.
//!
//! Severity depends only on the metric name, its value and the threshold
//! table. Unknown metrics and categorical values are always `ok`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DiagError, DiagResult};
use crate::metric::Metric;

/// Index every collection has; exempt from the unused-index rule.
pub const PRIMARY_KEY_INDEX: &str = "_id_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warn,
    Critical,
}

impl Severity {
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Ok => "✓",
            Self::Warn => "⚠",
            Self::Critical => "✗",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warn => write!(f, "warn"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Larger values are worse.
    Above,
    /// Smaller values are worse.
    Below,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Above
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub warn: f64,
    pub critical: f64,
    #[serde(default)]
    pub direction: Direction,
}

impl ThresholdRule {
    pub const fn above(warn: f64, critical: f64) -> Self {
        Self {
            warn,
            critical,
            direction: Direction::Above,
        }
    }

    pub const fn below(warn: f64, critical: f64) -> Self {
        Self {
            warn,
            critical,
            direction: Direction::Below,
        }
    }

    /// A value equal to a threshold counts as crossing it.
    pub fn classify(&self, value: f64) -> Severity {
        let crossed = |limit: f64| match self.direction {
            Direction::Above => value >= limit,
            Direction::Below => value <= limit,
        };
        if crossed(self.critical) {
            Severity::Critical
        } else if crossed(self.warn) {
            Severity::Warn
        } else {
            Severity::Ok
        }
    }

    fn validate(&self, metric: &str) -> DiagResult<()> {
        if !self.warn.is_finite() || !self.critical.is_finite() {
            return Err(DiagError::Config(format!(
                "threshold for '{metric}' must be finite"
            )));
        }
        let ordered = match self.direction {
            Direction::Above => self.warn <= self.critical,
            Direction::Below => self.warn >= self.critical,
        };
        if !ordered {
            return Err(DiagError::Config(format!(
                "threshold for '{metric}': warn {} must not be past critical {} for direction {:?}",
                self.warn, self.critical, self.direction
            )));
        }
        Ok(())
    }
}

/// Metric name -> rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    rules: BTreeMap<String, ThresholdRule>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let rules = [
            ("replication_lag_seconds", ThresholdRule::above(5.0, 10.0)),
            ("fragmentation_pct", ThresholdRule::above(25.0, 50.0)),
            ("chunk_max_min_ratio", ThresholdRule::above(1.5, 3.0)),
            ("index_to_data_ratio_pct", ThresholdRule::above(25.0, 50.0)),
            ("disk_usage_pct", ThresholdRule::above(80.0, 90.0)),
            ("oplog_window_hours", ThresholdRule::below(24.0, 12.0)),
            ("unhealthy_members", ThresholdRule::above(1.0, 2.0)),
            ("balancer_enabled", ThresholdRule::below(0.0, -1.0)),
            ("aggregation_runtime_seconds", ThresholdRule::above(10.0, 60.0)),
            ("redundant_indexes", ThresholdRule::above(1.0, 3.0)),
            ("only_primary_key_index", ThresholdRule::above(1.0, 2.0)),
        ];
        Self {
            rules: rules
                .into_iter()
                .map(|(name, rule)| (name.to_string(), rule))
                .collect(),
        }
    }
}

impl ThresholdTable {
    /// Defaults with `overrides` replacing rules of the same name.
    pub fn with_overrides(overrides: &BTreeMap<String, ThresholdRule>) -> DiagResult<Self> {
        let mut table = Self::default();
        for (name, rule) in overrides {
            rule.validate(name)?;
            table.rules.insert(name.clone(), *rule);
        }
        Ok(table)
    }

    pub fn get(&self, metric: &str) -> Option<&ThresholdRule> {
        self.rules.get(metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ThresholdRule)> {
        self.rules.iter()
    }
}

/// A metric with its assigned severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub metric: Metric,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Finding {
    pub fn has_anomaly(&self) -> bool {
        self.metric.anomaly.is_some()
    }
}

/// Classify one metric. Never fails.
pub fn evaluate(metric: Metric, thresholds: &ThresholdTable) -> Finding {
    let severity = match (metric.value.as_f64(), thresholds.get(&metric.name)) {
        (Some(value), Some(rule)) => rule.classify(value),
        _ => Severity::Ok,
    };
    let recommendation = recommend(&metric, severity);
    Finding {
        metric,
        severity,
        recommendation,
    }
}

fn recommend(metric: &Metric, severity: Severity) -> Option<String> {
    if metric.anomaly.is_some() {
        return Some("Optimes out of order: check clock sync between members".into());
    }

    if metric.name == "index_ops_count"
        && metric.value.as_f64() == Some(0.0)
        && metric.label("index") != Some(PRIMARY_KEY_INDEX)
    {
        return Some("Unused index: candidate for removal".into());
    }

    if severity == Severity::Ok {
        return None;
    }

    let text = match metric.name.as_str() {
        "replication_lag_seconds" => {
            "High replication lag: check network and load on the secondary"
        }
        "fragmentation_pct" => "High fragmentation: consider compaction",
        "chunk_max_min_ratio" => {
            "Uneven chunk distribution: check balancer activity and shard key choice"
        }
        "index_to_data_ratio_pct" => {
            "Indexes large relative to data: review unused or redundant indexes"
        }
        "disk_usage_pct" => "Disk space running low: add capacity or reclaim space",
        "oplog_window_hours" => "Oplog covers less than a day: consider increasing its size",
        "unhealthy_members" => "Replica set members unreachable: check member hosts",
        "balancer_enabled" => "Balancer disabled: chunk distribution will not self-correct",
        "aggregation_runtime_seconds" => {
            "Slow aggregation: add a leading $match or an index for $sort/$lookup"
        }
        "redundant_indexes" => {
            "Redundant indexes: drop duplicates and prefixes already covered by a compound index"
        }
        "only_primary_key_index" => {
            "Large collection indexed only on _id: queries scan the collection, index common filters"
        }
        _ => return None,
    };
    Some(text.to_string())
}
