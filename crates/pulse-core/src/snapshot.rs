//! Canned responses served as a [`ClusterTarget`].
//!
//! A snapshot maps query keys to the payload the live query returned, so a
//! captured deployment can be re-evaluated offline. Per-database queries use
//! `<query>.<database>` keys, e.g. `index_usage.social`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{DiagError, DiagResult};
use crate::target::{ClusterTarget, CurrentOpFilter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub endpoint: String,
    #[serde(default)]
    pub queries: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn from_file(path: &Path) -> DiagResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiagError::Config(format!("Cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| DiagError::Config(format!("Invalid snapshot {}: {e}", path.display())))
    }

    /// Record every query `target` answers.
    ///
    /// Per-database queries run for `databases`, or for every user database
    /// when empty. Failing queries are logged and left out, so replaying the
    /// snapshot reproduces them as failed sources.
    pub async fn capture(target: &dyn ClusterTarget, databases: &[String]) -> Self {
        let mut queries = BTreeMap::new();
        let mut record = |key: String, result: DiagResult<Value>| match result {
            Ok(payload) => {
                queries.insert(key, payload);
            }
            Err(e) => tracing::warn!(query = %key, error = %e, "Query failed during capture"),
        };

        let listed = target.list_databases().await;
        let databases: Vec<String> = if databases.is_empty() {
            listed
                .as_ref()
                .ok()
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        } else {
            databases.to_vec()
        };
        record("list_databases".into(), listed);
        record("list_shards".into(), target.list_shards().await);
        record("chunk_distribution".into(), target.chunk_distribution().await);
        record("balancer_status".into(), target.balancer_status().await);
        record("replica_set_status".into(), target.replica_set_status().await);
        record("oplog_window".into(), target.oplog_window().await);
        for db in &databases {
            record(format!("index_usage.{db}"), target.index_usage(db).await);
            record(format!("collection_stats.{db}"), target.collection_stats(db).await);
            record(format!("database_stats.{db}"), target.database_stats(db).await);
        }
        let all_aggregations = CurrentOpFilter {
            min_secs_running: 0,
            aggregations_only: true,
        };
        record("current_ops".into(), target.current_ops(&all_aggregations).await);

        Self {
            endpoint: target.endpoint().to_string(),
            queries,
        }
    }

    pub fn to_yaml(&self) -> DiagResult<String> {
        serde_yaml::to_string(self).map_err(|e| DiagError::Other(e.into()))
    }
}

pub struct SnapshotTarget {
    snapshot: Snapshot,
    delays: BTreeMap<String, Duration>,
    unreachable: BTreeMap<String, String>,
}

impl SnapshotTarget {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::from_snapshot(Snapshot {
            endpoint: endpoint.into(),
            queries: BTreeMap::new(),
        })
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            delays: BTreeMap::new(),
            unreachable: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, payload: Value) -> Self {
        self.snapshot.queries.insert(key.into(), payload);
        self
    }

    /// Delay the response to `key`.
    pub fn with_delay(mut self, key: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(key.into(), delay);
        self
    }

    /// Make `key` fail with a connection error.
    pub fn with_unreachable(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.unreachable.insert(key.into(), message.into());
        self
    }

    async fn answer(&self, key: &str) -> DiagResult<Value> {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.unreachable.get(key) {
            return Err(DiagError::Connection(anyhow::anyhow!("{message}")));
        }
        self.snapshot
            .queries
            .get(key)
            .cloned()
            .ok_or_else(|| DiagError::Other(anyhow::anyhow!("no snapshot entry for '{key}'")))
    }
}

#[async_trait]
impl ClusterTarget for SnapshotTarget {
    fn endpoint(&self) -> &str {
        &self.snapshot.endpoint
    }

    async fn list_databases(&self) -> DiagResult<Value> {
        self.answer("list_databases").await
    }

    async fn list_shards(&self) -> DiagResult<Value> {
        self.answer("list_shards").await
    }

    async fn chunk_distribution(&self) -> DiagResult<Value> {
        self.answer("chunk_distribution").await
    }

    async fn balancer_status(&self) -> DiagResult<Value> {
        self.answer("balancer_status").await
    }

    async fn replica_set_status(&self) -> DiagResult<Value> {
        self.answer("replica_set_status").await
    }

    async fn oplog_window(&self) -> DiagResult<Value> {
        self.answer("oplog_window").await
    }

    async fn index_usage(&self, database: &str) -> DiagResult<Value> {
        self.answer(&format!("index_usage.{database}")).await
    }

    async fn collection_stats(&self, database: &str) -> DiagResult<Value> {
        self.answer(&format!("collection_stats.{database}")).await
    }

    async fn database_stats(&self, database: &str) -> DiagResult<Value> {
        self.answer(&format!("database_stats.{database}")).await
    }

    async fn current_ops(&self, filter: &CurrentOpFilter) -> DiagResult<Value> {
        let mut payload = self.answer("current_ops").await?;
        if let Some(inprog) = payload.get_mut("inprog").and_then(Value::as_array_mut) {
            let min = filter.min_secs_running as f64;
            inprog.retain(|op| {
                op.get("secs_running")
                    .and_then(Value::as_f64)
                    .map_or(false, |secs| secs >= min)
            });
        }
        Ok(payload)
    }
}
