//! Maps raw source responses onto uniform [`Metric`] records.
//!
//! Each payload kind has its own mapping rules. A failed fetch yields no
//! metrics. A payload that does not have the expected shape yields
//! [`DiagError::MalformedResponse`]; the fetch itself still counts as a
//! success, since the transport worked and only the mapping did not.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DiagError, DiagResult};
use crate::metric::Metric;
use crate::source::{PayloadKind, RawResult};
use crate::subsystem::Subsystem;

mod aggregation;
mod indexing;
mod replication;
mod sharding;
mod storage;

/// Source identity passed to the per-kind mapping functions.
pub(crate) struct Origin<'a> {
    pub source: &'a str,
    pub subsystem: Subsystem,
    pub at: DateTime<Utc>,
}

impl Origin<'_> {
    pub fn metric(&self, name: &str, value: f64, unit: crate::metric::Unit) -> Metric {
        Metric::number(name, value, unit, self.subsystem, self.source, self.at)
    }

    pub fn malformed(&self, field: impl Into<String>) -> DiagError {
        DiagError::MalformedResponse {
            subsystem: self.subsystem,
            field: field.into(),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, payload: &Value) -> DiagResult<T> {
        serde_json::from_value(payload.clone()).map_err(|e| self.malformed(e.to_string()))
    }
}

/// Map a raw result, reporting shape mismatches as errors.
pub fn try_normalize(raw: &RawResult) -> DiagResult<Vec<Metric>> {
    let payload = match &raw.outcome {
        Ok(payload) => payload,
        Err(_) => return Ok(Vec::new()),
    };

    let origin = Origin {
        source: &raw.source_id,
        subsystem: raw.subsystem,
        at: raw.fetched_at,
    };

    match raw.kind {
        PayloadKind::ChunkDistribution => sharding::chunk_distribution(&origin, payload),
        PayloadKind::BalancerStatus => sharding::balancer(&origin, payload),
        PayloadKind::ReplicaSetStatus => replication::member_status(&origin, payload),
        PayloadKind::OplogWindow => replication::oplog_window(&origin, payload),
        PayloadKind::IndexUsage => indexing::index_usage(&origin, payload),
        PayloadKind::CollectionStats => storage::collection_stats(&origin, payload),
        PayloadKind::DatabaseStats => storage::database_stats(&origin, payload),
        PayloadKind::LongRunningOps => aggregation::long_running(&origin, payload),
    }
}

/// Per-database failures a multi-database source reported next to its
/// answers, as `database 'name': error` lines.
pub fn partial_failures(raw: &RawResult) -> Vec<String> {
    let Ok(payload) = &raw.outcome else {
        return Vec::new();
    };
    payload
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    let db = e.get("database").and_then(Value::as_str).unwrap_or("?");
                    let error = e.get("error").and_then(Value::as_str).unwrap_or("unknown error");
                    format!("database '{db}': {error}")
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use super::*;

    pub fn raw(kind: PayloadKind, subsystem: Subsystem, payload: Value) -> RawResult {
        RawResult {
            source_id: "test.source".into(),
            subsystem,
            kind,
            fetched_at: Utc::now(),
            elapsed: Duration::from_millis(5),
            attempts: 1,
            outcome: Ok(payload),
        }
    }

    pub fn find<'a>(metrics: &'a [Metric], name: &str, label: (&str, &str)) -> &'a Metric {
        metrics
            .iter()
            .find(|m| m.name == name && m.label(label.0) == Some(label.1))
            .unwrap_or_else(|| panic!("no {name} metric with {}={}", label.0, label.1))
    }
}
