use serde::Deserialize;
use serde_json::Value;

use super::Origin;
use crate::error::DiagResult;
use crate::metric::{Metric, Unit};

#[derive(Deserialize)]
struct CollectionStatsPayload {
    databases: Vec<DatabaseCollections>,
}

#[derive(Deserialize)]
struct DatabaseCollections {
    collections: Vec<CollStats>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollStats {
    ns: String,
    size: f64,
    storage_size: f64,
    total_index_size: f64,
}

#[derive(Deserialize)]
struct DatabaseStatsPayload {
    databases: Vec<DbStats>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbStats {
    db: String,
    #[serde(default)]
    fs_used_size: Option<f64>,
    #[serde(default)]
    fs_total_size: Option<f64>,
}

/// Share of allocated storage not holding live data, in `[0, 100]`.
/// Zero when nothing is allocated.
pub(crate) fn fragmentation_pct(size: f64, storage_size: f64) -> f64 {
    if storage_size <= 0.0 {
        return 0.0;
    }
    ((storage_size - size) / storage_size * 100.0).clamp(0.0, 100.0)
}

/// Index bytes relative to data bytes. Zero for an empty collection.
pub(crate) fn index_to_data_ratio_pct(total_index_size: f64, size: f64) -> f64 {
    if size <= 0.0 {
        return 0.0;
    }
    total_index_size / size * 100.0
}

pub(super) fn collection_stats(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let parsed: CollectionStatsPayload = origin.parse(payload)?;
    let mut metrics = Vec::new();

    for coll in parsed.databases.iter().flat_map(|db| &db.collections) {
        metrics.push(
            origin
                .metric(
                    "fragmentation_pct",
                    fragmentation_pct(coll.size, coll.storage_size),
                    Unit::Percent,
                )
                .with_label("namespace", &coll.ns),
        );
        metrics.push(
            origin
                .metric(
                    "index_to_data_ratio_pct",
                    index_to_data_ratio_pct(coll.total_index_size, coll.size),
                    Unit::Percent,
                )
                .with_label("namespace", &coll.ns),
        );
    }
    Ok(metrics)
}

pub(super) fn database_stats(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let parsed: DatabaseStatsPayload = origin.parse(payload)?;
    let mut metrics = Vec::new();

    for db in &parsed.databases {
        // Only reported by servers that can see their filesystem.
        let (Some(used), Some(total)) = (db.fs_used_size, db.fs_total_size) else {
            continue;
        };
        if total <= 0.0 {
            continue;
        }
        let pct = (used / total * 100.0).clamp(0.0, 100.0);
        metrics.push(
            origin
                .metric("disk_usage_pct", pct, Unit::Percent)
                .with_label("database", &db.db),
        );
    }
    Ok(metrics)
}
