use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::Origin;
use crate::error::DiagResult;
use crate::metric::{Metric, Unit};

#[derive(Deserialize)]
struct ChunkPayload {
    shards: Vec<ShardEntry>,
    chunks: Vec<ChunkCount>,
}

#[derive(Deserialize)]
struct ShardEntry {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct ChunkCount {
    namespace: String,
    shard: String,
    count: f64,
}

#[derive(Deserialize)]
struct BalancerPayload {
    mode: String,
}

pub(super) fn chunk_distribution(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let parsed: ChunkPayload = origin.parse(payload)?;

    // Listed shards that hold no chunk of a namespace still count, as zero.
    let mut by_namespace: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for chunk in &parsed.chunks {
        by_namespace.entry(chunk.namespace.clone()).or_default();
    }
    for per_shard in by_namespace.values_mut() {
        for shard in &parsed.shards {
            per_shard.insert(shard.id.clone(), 0.0);
        }
    }
    for chunk in parsed.chunks {
        *by_namespace
            .entry(chunk.namespace)
            .or_default()
            .entry(chunk.shard)
            .or_insert(0.0) += chunk.count;
    }

    let mut metrics = Vec::new();
    for (namespace, per_shard) in &by_namespace {
        for (shard, count) in per_shard {
            metrics.push(
                origin
                    .metric("chunks_per_shard", *count, Unit::Count)
                    .with_label("namespace", namespace)
                    .with_label("shard", shard),
            );
        }

        let counts: Vec<f64> = per_shard.values().copied().collect();
        metrics.push(
            origin
                .metric("chunk_max_min_ratio", max_min_ratio(&counts), Unit::Ratio)
                .with_label("namespace", namespace),
        );
        metrics.push(
            origin
                .metric("chunk_count_stddev", stddev(&counts), Unit::Count)
                .with_label("namespace", namespace),
        );
    }
    Ok(metrics)
}

pub(super) fn balancer(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let parsed: BalancerPayload = origin.parse(payload)?;
    let enabled = if parsed.mode == "off" { 0.0 } else { 1.0 };
    Ok(vec![origin
        .metric("balancer_enabled", enabled, Unit::Flag)
        .with_label("mode", parsed.mode)])
}

/// Largest count over smallest, with the smallest floored at 1 so an empty
/// shard gives a finite (and large) ratio.
fn max_min_ratio(counts: &[f64]) -> f64 {
    let max = counts.iter().copied().fold(f64::MIN, f64::max);
    let min = counts.iter().copied().fold(f64::MAX, f64::min);
    if counts.is_empty() || max <= 0.0 {
        return 1.0;
    }
    max / min.max(1.0)
}

/// Population standard deviation.
fn stddev(counts: &[f64]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<f64>() / n;
    (counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{find, raw};
    use super::super::try_normalize;
    use crate::metric::MetricValue;
    use crate::source::PayloadKind;
    use crate::subsystem::Subsystem;
    use serde_json::json;

    fn shards(ids: &[&str]) -> serde_json::Value {
        json!(ids.iter().map(|id| json!({"_id": id, "host": format!("{id}/h:27018")})).collect::<Vec<_>>())
    }

    #[test]
    fn one_metric_per_shard_plus_aggregates() {
        let payload = json!({
            "shards": shards(&["s0", "s1", "s2"]),
            "chunks": [
                {"namespace": "social.posts", "shard": "s0", "count": 120},
                {"namespace": "social.posts", "shard": "s1", "count": 40},
                {"namespace": "social.posts", "shard": "s2", "count": 40},
            ],
        });
        let metrics =
            try_normalize(&raw(PayloadKind::ChunkDistribution, Subsystem::Sharding, payload))
                .unwrap();

        assert_eq!(metrics.iter().filter(|m| m.name == "chunks_per_shard").count(), 3);
        let ratio = find(&metrics, "chunk_max_min_ratio", ("namespace", "social.posts"));
        assert_eq!(ratio.value, MetricValue::Number(3.0));
        let sd = find(&metrics, "chunk_count_stddev", ("namespace", "social.posts"));
        let v = sd.value.as_f64().unwrap();
        assert!((v - 37.712).abs() < 0.01, "stddev was {v}");
    }

    #[test]
    fn listed_shard_without_chunks_counts_as_zero() {
        let payload = json!({
            "shards": shards(&["s0", "s1"]),
            "chunks": [{"namespace": "social.users", "shard": "s0", "count": 8}],
        });
        let metrics =
            try_normalize(&raw(PayloadKind::ChunkDistribution, Subsystem::Sharding, payload))
                .unwrap();
        let empty = find(&metrics, "chunks_per_shard", ("shard", "s1"));
        assert_eq!(empty.value, MetricValue::Number(0.0));
        let ratio = find(&metrics, "chunk_max_min_ratio", ("namespace", "social.users"));
        assert_eq!(ratio.value, MetricValue::Number(8.0));
    }

    #[test]
    fn balancer_off_is_zero() {
        let metrics = try_normalize(&raw(
            PayloadKind::BalancerStatus,
            Subsystem::Sharding,
            json!({"mode": "off", "inBalancerRound": false}),
        ))
        .unwrap();
        assert_eq!(metrics[0].name, "balancer_enabled");
        assert_eq!(metrics[0].value, MetricValue::Number(0.0));
    }
}
