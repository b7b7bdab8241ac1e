use async_trait::async_trait;
use serde_json::Value;

use crate::error::DiagResult;
use crate::source::{MetricSource, PayloadKind, SourceDescriptor};
use crate::subsystem::Subsystem;
use crate::target::{ClusterTarget, CurrentOpFilter};

/// In-progress aggregate commands running longer than `min_secs`.
pub struct LongRunningAggregationsSource {
    min_secs: u64,
}

impl LongRunningAggregationsSource {
    pub fn new(min_secs: u64) -> Self {
        Self { min_secs }
    }
}

#[async_trait]
impl MetricSource for LongRunningAggregationsSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "aggregation.long_running".into(),
            description: "Aggregation pipelines currently running longer than the slow-op threshold"
                .into(),
            subsystem: Subsystem::Aggregation,
            kind: PayloadKind::LongRunningOps,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        target
            .current_ops(&CurrentOpFilter {
                min_secs_running: self.min_secs,
                aggregations_only: true,
            })
            .await
    }
}
