use serde::Deserialize;
use serde_json::Value;

use super::Origin;
use crate::error::DiagResult;
use crate::evaluate::PRIMARY_KEY_INDEX;
use crate::metric::{Metric, Unit};

/// Collections above this size with only the primary key index are
/// likely served by collection scans.
pub const COLLSCAN_RISK_DOCUMENTS: f64 = 1000.0;

#[derive(Deserialize)]
struct IndexUsagePayload {
    databases: Vec<DatabaseIndexes>,
}

#[derive(Deserialize)]
struct DatabaseIndexes {
    database: String,
    collections: Vec<CollectionIndexes>,
}

#[derive(Deserialize)]
struct CollectionIndexes {
    name: String,
    #[serde(default)]
    documents: Option<f64>,
    indexes: Vec<IndexStat>,
}

#[derive(Deserialize)]
struct IndexStat {
    name: String,
    accesses: Accesses,
    /// Key pattern as ordered `[field, direction]` pairs.
    #[serde(default)]
    key: Option<Vec<(String, Value)>>,
}

#[derive(Deserialize)]
struct Accesses {
    ops: f64,
}

pub(super) fn index_usage(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let parsed: IndexUsagePayload = origin.parse(payload)?;
    let mut metrics = Vec::new();

    for db in &parsed.databases {
        for coll in &db.collections {
            let namespace = format!("{}.{}", db.database, coll.name);
            for index in &coll.indexes {
                let mut metric = origin
                    .metric("index_ops_count", index.accesses.ops, Unit::Count)
                    .with_label("namespace", &namespace)
                    .with_label("index", &index.name);
                if let Some(docs) = coll.documents {
                    metric = metric.with_label("documents", format!("{}", docs as u64));
                }
                metrics.push(metric);
            }

            if let Some(docs) = coll.documents {
                let only_pk = docs > COLLSCAN_RISK_DOCUMENTS
                    && !coll.indexes.is_empty()
                    && coll.indexes.iter().all(|i| i.name == PRIMARY_KEY_INDEX);
                metrics.push(
                    origin
                        .metric("only_primary_key_index", if only_pk { 1.0 } else { 0.0 }, Unit::Flag)
                        .with_label("namespace", &namespace)
                        .with_label("documents", format!("{}", docs as u64)),
                );
            }

            if let Some(redundant) = redundant_indexes(&coll.indexes) {
                let mut metric = origin
                    .metric("redundant_indexes", redundant.len() as f64, Unit::Count)
                    .with_label("namespace", &namespace);
                if !redundant.is_empty() {
                    metric = metric.with_label("indexes", redundant.join(", "));
                }
                metrics.push(metric);
            }
        }
    }
    Ok(metrics)
}

/// Indexes made redundant by another index on the same collection: exact
/// key duplicates, and keys that are a strict prefix of a longer key with
/// the same directions. `None` when some index has no key pattern.
///
/// Sharded deployments report every index once per shard, so entries are
/// merged by name first.
fn redundant_indexes(indexes: &[IndexStat]) -> Option<Vec<String>> {
    let mut keyed: Vec<(&str, &[(String, Value)])> = Vec::new();
    for index in indexes {
        let key = index.key.as_deref()?;
        if !keyed.iter().any(|(name, _)| *name == index.name) {
            keyed.push((index.name.as_str(), key));
        }
    }

    let mut redundant = Vec::new();
    for (i, (name, key)) in keyed.iter().enumerate() {
        if *name == PRIMARY_KEY_INDEX || key.is_empty() {
            continue;
        }
        let covered = keyed.iter().enumerate().find_map(|(j, (other, other_key))| {
            if i == j {
                return None;
            }
            if other_key == key {
                // Of two identical keys only the later one is flagged.
                (j < i).then(|| format!("{name} (duplicate of {other})"))
            } else if other_key.len() > key.len() && other_key.starts_with(key) {
                Some(format!("{name} (prefix of {other})"))
            } else {
                None
            }
        });
        if let Some(entry) = covered {
            redundant.push(entry);
        }
    }
    Some(redundant)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{find, raw};
    use super::super::try_normalize;
    use crate::metric::MetricValue;
    use crate::source::PayloadKind;
    use crate::subsystem::Subsystem;
    use serde_json::json;

    #[test]
    fn one_metric_per_index() {
        let payload = json!({"databases": [{
            "database": "social",
            "collections": [{
                "name": "posts",
                "documents": 10000,
                "indexes": [
                    {"name": "_id_", "accesses": {"ops": 0}},
                    {"name": "author_1", "accesses": {"ops": 512}},
                    {"name": "tags_1", "accesses": {"ops": 0}},
                ],
            }],
        }]});
        let metrics =
            try_normalize(&raw(PayloadKind::IndexUsage, Subsystem::Indexing, payload)).unwrap();

        assert_eq!(
            metrics.iter().filter(|m| m.name == "index_ops_count").count(),
            3
        );
        let author = find(&metrics, "index_ops_count", ("index", "author_1"));
        assert_eq!(author.value, MetricValue::Number(512.0));
        assert_eq!(author.label("namespace"), Some("social.posts"));
        assert_eq!(author.label("documents"), Some("10000"));
    }

    #[test]
    fn missing_access_counters_are_malformed() {
        let payload = json!({"databases": [{
            "database": "social",
            "collections": [{"name": "posts", "indexes": [{"name": "_id_"}]}],
        }]});
        assert!(try_normalize(&raw(PayloadKind::IndexUsage, Subsystem::Indexing, payload)).is_err());
    }

    #[test]
    fn flags_duplicate_and_prefix_indexes() {
        let payload = json!({"databases": [{
            "database": "social",
            "collections": [{
                "name": "posts",
                "documents": 10000,
                "indexes": [
                    {"name": "_id_", "key": [["_id", 1]], "accesses": {"ops": 1}},
                    {"name": "author_1", "key": [["author", 1]], "accesses": {"ops": 5}},
                    {"name": "author_1_created_-1", "key": [["author", 1], ["created", -1]], "accesses": {"ops": 9}},
                    {"name": "author_asc", "key": [["author", 1]], "accesses": {"ops": 0}},
                    {"name": "created_1", "key": [["created", 1]], "accesses": {"ops": 2}},
                ],
            }],
        }]});
        let metrics =
            try_normalize(&raw(PayloadKind::IndexUsage, Subsystem::Indexing, payload)).unwrap();

        let redundant = find(&metrics, "redundant_indexes", ("namespace", "social.posts"));
        assert_eq!(redundant.value, MetricValue::Number(2.0));
        let listed = redundant.label("indexes").unwrap();
        assert!(listed.contains("author_1 (prefix of author_1_created_-1)"));
        assert!(listed.contains("author_asc (duplicate of author_1)"));
        // Same field, other direction: not a prefix.
        assert!(!listed.contains("created_1"));
    }

    #[test]
    fn per_shard_rows_of_one_index_are_not_duplicates() {
        let payload = json!({"databases": [{
            "database": "social",
            "collections": [{
                "name": "posts",
                "indexes": [
                    {"name": "_id_", "key": [["_id", 1]], "accesses": {"ops": 1}},
                    {"name": "tags_1", "key": [["tags", 1]], "accesses": {"ops": 3}},
                    {"name": "tags_1", "key": [["tags", 1]], "accesses": {"ops": 4}},
                ],
            }],
        }]});
        let metrics =
            try_normalize(&raw(PayloadKind::IndexUsage, Subsystem::Indexing, payload)).unwrap();
        let redundant = find(&metrics, "redundant_indexes", ("namespace", "social.posts"));
        assert_eq!(redundant.value, MetricValue::Number(0.0));
        assert_eq!(redundant.label("indexes"), None);
    }

    #[test]
    fn large_collection_with_only_primary_key_is_flagged() {
        let payload = json!({"databases": [{
            "database": "social",
            "collections": [
                {"name": "events", "documents": 50000,
                 "indexes": [{"name": "_id_", "accesses": {"ops": 12}}]},
                {"name": "settings", "documents": 40,
                 "indexes": [{"name": "_id_", "accesses": {"ops": 3}}]},
            ],
        }]});
        let metrics =
            try_normalize(&raw(PayloadKind::IndexUsage, Subsystem::Indexing, payload)).unwrap();

        let events = find(&metrics, "only_primary_key_index", ("namespace", "social.events"));
        assert_eq!(events.value, MetricValue::Number(1.0));
        let small = find(&metrics, "only_primary_key_index", ("namespace", "social.settings"));
        assert_eq!(small.value, MetricValue::Number(0.0));
        // No key patterns, no redundancy verdict.
        assert!(metrics.iter().all(|m| m.name != "redundant_indexes"));
    }
}
