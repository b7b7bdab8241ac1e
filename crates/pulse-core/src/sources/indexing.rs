use async_trait::async_trait;
use serde_json::Value;

use crate::error::DiagResult;
use crate::source::{MetricSource, PayloadKind, SourceDescriptor};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

use super::{per_database, resolve_databases};

/// `$indexStats` access counters for every collection in scope.
pub struct IndexUsageSource {
    databases: Vec<String>,
}

impl IndexUsageSource {
    pub fn new(databases: Vec<String>) -> Self {
        Self { databases }
    }
}

#[async_trait]
impl MetricSource for IndexUsageSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "indexing.index_usage".into(),
            description: "Per-index access counters, flags unused indexes".into(),
            subsystem: Subsystem::Indexing,
            kind: PayloadKind::IndexUsage,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        let databases = resolve_databases(target, &self.databases, Subsystem::Indexing).await?;
        per_database(&databases, |db| target.index_usage(db)).await
    }
}
