use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::{DiagError, DiagResult};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

/// Shape of the payload a source returns; selects the normalization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    ChunkDistribution,
    BalancerStatus,
    ReplicaSetStatus,
    OplogWindow,
    IndexUsage,
    CollectionStats,
    DatabaseStats,
    LongRunningOps,
}

/// Metadata describing a metric source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub description: String,
    pub subsystem: Subsystem,
    pub kind: PayloadKind,
}

/// One read-only administrative query.
#[async_trait]
pub trait MetricSource: Send + Sync {
    fn descriptor(&self) -> SourceDescriptor;

    /// Run the query. Errors are turned into a failed `RawResult` by `fetch`.
    async fn query(&self, target: &dyn ClusterTarget) -> DiagResult<Value>;
}

/// Per-source timeout and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Total attempts, including the first. 1 disables retry.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Timeout,
    Query,
}

/// Transport-level failure captured as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl From<&DiagError> for FetchFailure {
    fn from(e: &DiagError) -> Self {
        let kind = match e {
            DiagError::Connection(_) => FailureKind::Connection,
            DiagError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Query,
        };
        Self {
            kind,
            detail: e.to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            FailureKind::Connection => "connection",
            FailureKind::Timeout => "timeout",
            FailureKind::Query => "query",
        };
        write!(f, "{label}: {}", self.detail)
    }
}

/// Response of a single source invocation.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub source_id: String,
    pub subsystem: Subsystem,
    pub kind: PayloadKind,
    pub fetched_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub attempts: u32,
    pub outcome: Result<Value, FetchFailure>,
}

impl RawResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run `source` against `target` under `policy`. Never fails: timeouts and
/// transport errors come back as a failed `RawResult`.
pub async fn fetch(
    source: &dyn MetricSource,
    target: &dyn ClusterTarget,
    policy: &SourcePolicy,
) -> RawResult {
    let descriptor = source.descriptor();
    let fetched_at = Utc::now();
    let started = tokio::time::Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    let outcome = loop {
        attempts += 1;
        let result = match tokio::time::timeout(policy.timeout, source.query(target)).await {
            Ok(result) => result,
            Err(_) => Err(DiagError::Timeout(policy.timeout)),
        };

        match result {
            Ok(payload) => break Ok(payload),
            Err(e) if attempts < max_attempts => {
                tracing::warn!(
                    source = %descriptor.id,
                    attempt = attempts,
                    error = %e,
                    "Source query failed, retrying"
                );
                if !policy.retry_delay.is_zero() {
                    tokio::time::sleep(policy.retry_delay).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    source = %descriptor.id,
                    attempts,
                    error = %e,
                    "Source query failed"
                );
                break Err(FetchFailure::from(&e));
            }
        }
    };

    let elapsed = started.elapsed();
    tracing::debug!(
        source = %descriptor.id,
        elapsed_ms = elapsed.as_millis() as u64,
        success = outcome.is_ok(),
        "Source fetched"
    );

    RawResult {
        source_id: descriptor.id,
        subsystem: descriptor.subsystem,
        kind: descriptor.kind,
        fetched_at,
        elapsed,
        attempts,
        outcome,
    }
}
