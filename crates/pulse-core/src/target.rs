use async_trait::async_trait;
use serde_json::Value;

use crate::error::DiagResult;

/// Filter for `current_ops`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentOpFilter {
    /// Only operations running at least this many seconds.
    pub min_secs_running: u64,
    /// Only aggregate commands.
    pub aggregations_only: bool,
}

/// Read-only handle to a database deployment.
///
/// Each method wraps one administrative query and returns the response as
/// JSON. Implementations never issue mutating commands. Payload shapes:
///
/// - `list_databases`: `["db", ...]`, system databases excluded
/// - `list_shards`: `{"shards": [{"_id", "host", "state"}]}`
/// - `chunk_distribution`: `{"chunks": [{"namespace", "shard", "count"}]}`
/// - `balancer_status`: `{"mode", "inBalancerRound"}`
/// - `replica_set_status`: `{"set", "members": [{"name", "state", "stateStr", "health", "optimeDate"}]}`
///   with `optimeDate` in epoch milliseconds
/// - `oplog_window`: `{"firstTs", "lastTs"}` in epoch seconds
/// - `index_usage`: `{"database", "collections": [{"name", "documents", "indexes": [{"name", "key", "accesses": {"ops"}}]}]}`
///   where `key` is the ordered `[[field, direction], ...]` pattern and `documents` may be null
/// - `collection_stats`: `{"database", "collections": [{"ns", "count", "size", "storageSize", "totalIndexSize"}]}`
/// - `database_stats`: `{"db", "dataSize", "storageSize", "indexSize", "fsUsedSize", "fsTotalSize"}`
/// - `current_ops`: `{"inprog": [{"opid", "ns", "op", "secs_running", "planSummary"}]}`
#[async_trait]
pub trait ClusterTarget: Send + Sync {
    /// Endpoint identity for reports. Must not contain credentials.
    fn endpoint(&self) -> &str;

    async fn list_databases(&self) -> DiagResult<Value>;

    async fn list_shards(&self) -> DiagResult<Value>;

    async fn chunk_distribution(&self) -> DiagResult<Value>;

    async fn balancer_status(&self) -> DiagResult<Value>;

    async fn replica_set_status(&self) -> DiagResult<Value>;

    async fn oplog_window(&self) -> DiagResult<Value>;

    async fn index_usage(&self, database: &str) -> DiagResult<Value>;

    async fn collection_stats(&self, database: &str) -> DiagResult<Value>;

    async fn database_stats(&self, database: &str) -> DiagResult<Value>;

    async fn current_ops(&self, filter: &CurrentOpFilter) -> DiagResult<Value>;
}
