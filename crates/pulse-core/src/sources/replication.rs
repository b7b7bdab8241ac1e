use async_trait::async_trait;
use serde_json::Value;

use crate::error::DiagResult;
use crate::source::{MetricSource, PayloadKind, SourceDescriptor};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

pub struct MemberStatusSource;

#[async_trait]
impl MetricSource for MemberStatusSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "replication.member_status".into(),
            description: "Replica set member health and secondary replication lag".into(),
            subsystem: Subsystem::Replication,
            kind: PayloadKind::ReplicaSetStatus,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        target.replica_set_status().await
    }
}

pub struct OplogWindowSource;

#[async_trait]
impl MetricSource for OplogWindowSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "replication.oplog_window".into(),
            description: "Time span covered by the oplog".into(),
            subsystem: Subsystem::Replication,
            kind: PayloadKind::OplogWindow,
        }
    }

    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value> {
        target.oplog_window().await
    }
}
