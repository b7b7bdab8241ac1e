use async_trait::async_trait;
use serde_json::Value;

use crate::error::DiagResult;
use crate::source::{MetricSource, PayloadKind, SourceDescriptor};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

use super::{per_database, resolve_databases};

pub struct CollectionStatsSource {
    databases: Vec<String>,
}

impl CollectionStatsSource {
    pub fn new(databases: Vec<String>) -> Self {
        Self { databases }
    }
}

#[async_trait]
impl MetricSource for CollectionStatsSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "storage.collection_stats".into(),
            description: "Fragmentation and index-to-data ratio per collection".into(),
            subsystem: Subsystem::Storage,
            kind: PayloadKind::CollectionStats,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        let databases = resolve_databases(target, &self.databases, Subsystem::Storage).await?;
        per_database(&databases, |db| target.collection_stats(db)).await
    }
}

pub struct DatabaseStatsSource {
    databases: Vec<String>,
}

impl DatabaseStatsSource {
    pub fn new(databases: Vec<String>) -> Self {
        Self { databases }
    }
}

#[async_trait]
impl MetricSource for DatabaseStatsSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "storage.database_stats".into(),
            description: "Filesystem usage reported by dbStats".into(),
            subsystem: Subsystem::Storage,
            kind: PayloadKind::DatabaseStats,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        let databases = resolve_databases(target, &self.databases, Subsystem::Storage).await?;
        per_database(&databases, |db| target.database_stats(db)).await
    }
}
