use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::future::Future;

use crate::error::{DiagError, DiagResult};
use crate::source::{MetricSource, SourceDescriptor};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

pub mod aggregation;
pub mod indexing;
pub mod replication;
pub mod sharding;
pub mod storage;

use aggregation::LongRunningAggregationsSource;
use indexing::IndexUsageSource;
use replication::{MemberStatusSource, OplogWindowSource};
use sharding::{BalancerSource, ChunkDistributionSource};
use storage::{CollectionStatsSource, DatabaseStatsSource};

/// Which databases and operations the per-database sources look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceScope {
    /// Databases to inspect. Empty means every non-system database.
    #[serde(default)]
    pub databases: Vec<String>,
    /// Minimum runtime for an operation to count as long-running.
    #[serde(default = "default_slow_op_secs")]
    pub slow_op_secs: u64,
}

fn default_slow_op_secs() -> u64 {
    1
}

impl Default for SourceScope {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            slow_op_secs: default_slow_op_secs(),
        }
    }
}

/// All built-in sources, in default subsystem order.
pub fn builtin_sources(scope: &SourceScope) -> Vec<Box<dyn MetricSource>> {
    vec![
        Box::new(ChunkDistributionSource),
        Box::new(BalancerSource),
        Box::new(MemberStatusSource),
        Box::new(OplogWindowSource),
        Box::new(IndexUsageSource::new(scope.databases.clone())),
        Box::new(CollectionStatsSource::new(scope.databases.clone())),
        Box::new(DatabaseStatsSource::new(scope.databases.clone())),
        Box::new(LongRunningAggregationsSource::new(scope.slow_op_secs)),
    ]
}

pub fn builtin_descriptors() -> Vec<SourceDescriptor> {
    builtin_sources(&SourceScope::default())
        .iter()
        .map(|s| s.descriptor())
        .collect()
}

/// Built-in sources for the given subsystems, grouped in that order.
pub fn sources_for(subsystems: &[Subsystem], scope: &SourceScope) -> Vec<Box<dyn MetricSource>> {
    let mut all: Vec<Option<Box<dyn MetricSource>>> =
        builtin_sources(scope).into_iter().map(Some).collect();
    let mut selected = Vec::new();
    for subsystem in subsystems {
        for slot in all.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.descriptor().subsystem == *subsystem) {
                if let Some(source) = slot.take() {
                    selected.push(source);
                }
            }
        }
    }
    selected
}

/// The scoped databases, or every non-system database on the target.
pub(crate) async fn resolve_databases(
    target: &dyn ClusterTarget,
    scoped: &[String],
    subsystem: Subsystem,
) -> DiagResult<Vec<String>> {
    if !scoped.is_empty() {
        return Ok(scoped.to_vec());
    }
    let listed = target.list_databases().await?;
    let names = listed
        .as_array()
        .ok_or_else(|| DiagError::MalformedResponse {
            subsystem,
            field: "listDatabases".into(),
        })?
        .iter()
        .filter_map(Value::as_str)
        .filter(|name| !matches!(*name, "admin" | "local" | "config"))
        .map(str::to_string)
        .collect();
    Ok(names)
}

/// Run `query` once per database and gather the answers under `databases`.
///
/// A database that fails is listed under `errors` with its message, so the
/// others still produce diagnostics. The query fails only when every
/// database does.
pub(crate) async fn per_database<'a, F, Fut>(databases: &'a [String], mut query: F) -> DiagResult<Value>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = DiagResult<Value>>,
{
    let mut payloads = Vec::with_capacity(databases.len());
    let mut errors = Vec::new();
    let mut last_error = None;

    for db in databases {
        match query(db).await {
            Ok(payload) => payloads.push(payload),
            Err(e) => {
                tracing::warn!(database = %db, error = %e, "Database query failed");
                errors.push(json!({ "database": db, "error": e.to_string() }));
                last_error = Some(e);
            }
        }
    }

    if payloads.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let mut out = Map::new();
    out.insert("databases".into(), Value::Array(payloads));
    if !errors.is_empty() {
        out.insert("errors".into(), Value::Array(errors));
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotTarget;

    #[test]
    fn builtin_ids_are_unique_and_prefixed_by_subsystem() {
        let descriptors = builtin_descriptors();
        let mut ids: Vec<_> = descriptors.iter().map(|d| d.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), descriptors.len());
        for d in &descriptors {
            assert!(d.id.starts_with(d.subsystem.as_str()), "{}", d.id);
        }
    }

    #[test]
    fn sources_follow_requested_subsystem_order() {
        let selected = sources_for(
            &[Subsystem::Storage, Subsystem::Sharding],
            &SourceScope::default(),
        );
        let ids: Vec<_> = selected.iter().map(|s| s.descriptor().id).collect();
        assert_eq!(
            ids,
            vec![
                "storage.collection_stats",
                "storage.database_stats",
                "sharding.chunk_distribution",
                "sharding.balancer",
            ]
        );
    }

    #[tokio::test]
    async fn one_failing_database_does_not_fail_the_rest() {
        let target = SnapshotTarget::new("snapshot://t")
            .with_entry("database_stats.social", json!({"db": "social"}))
            .with_unreachable("database_stats.analytics", "not authorized on analytics");
        let databases = vec!["social".to_string(), "analytics".to_string()];

        let payload = per_database(&databases, |db| target.database_stats(db))
            .await
            .unwrap();
        assert_eq!(payload["databases"].as_array().unwrap().len(), 1);
        assert_eq!(payload["errors"][0]["database"], "analytics");
        assert!(payload["errors"][0]["error"]
            .as_str()
            .unwrap()
            .contains("not authorized"));
    }

    #[tokio::test]
    async fn every_database_failing_fails_the_query() {
        let target = SnapshotTarget::new("snapshot://t")
            .with_unreachable("database_stats.analytics", "connection reset");
        let databases = vec!["analytics".to_string()];

        let result = per_database(&databases, |db| target.database_stats(db)).await;
        assert!(matches!(result, Err(DiagError::Connection(_))));
    }

    #[tokio::test]
    async fn no_databases_is_an_empty_answer() {
        let target = SnapshotTarget::new("snapshot://t");
        let payload = per_database(&[], |db| target.database_stats(db)).await.unwrap();
        assert_eq!(payload, json!({"databases": []}));
    }
}
