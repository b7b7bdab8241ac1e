use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::DiagResult;
use crate::source::{MetricSource, PayloadKind, SourceDescriptor};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

/// Shard list joined with per-namespace chunk counts.
pub struct ChunkDistributionSource;

#[async_trait]
impl MetricSource for ChunkDistributionSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "sharding.chunk_distribution".into(),
            description: "Chunk counts per shard and namespace, with balance ratios".into(),
            subsystem: Subsystem::Sharding,
            kind: PayloadKind::ChunkDistribution,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        let shards = target.list_shards().await?;
        let chunks = target.chunk_distribution().await?;
        Ok(json!({
            "shards": shards["shards"],
            "chunks": chunks["chunks"],
        }))
    }
}

pub struct BalancerSource;

#[async_trait]
impl MetricSource for BalancerSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "sharding.balancer".into(),
            description: "Whether the chunk balancer is enabled".into(),
            subsystem: Subsystem::Sharding,
            kind: PayloadKind::BalancerStatus,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        target.balancer_status().await
    }
}
