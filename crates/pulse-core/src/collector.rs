use futures::stream::{self, StreamExt};

use crate::source::{fetch, MetricSource, RawResult, SourcePolicy};
use crate::target::ClusterTarget;

/// A source together with the policy it runs under.
pub struct ConfiguredSource {
    pub source: Box<dyn MetricSource>,
    pub policy: SourcePolicy,
}

impl ConfiguredSource {
    pub fn new(source: Box<dyn MetricSource>, policy: SourcePolicy) -> Self {
        Self { source, policy }
    }
}

/// Runs sources against a target with bounded concurrency.
pub struct Collector {
    max_in_flight: usize,
}

impl Collector {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn sequential() -> Self {
        Self::new(1)
    }

    /// Fetch every source. Results come back in `sources` order regardless of
    /// completion order; a failing or slow source affects only its own entry.
    pub async fn collect(
        &self,
        target: &dyn ClusterTarget,
        sources: &[ConfiguredSource],
    ) -> Vec<RawResult> {
        tracing::debug!(
            sources = sources.len(),
            max_in_flight = self.max_in_flight,
            endpoint = %target.endpoint(),
            "Collecting"
        );
        stream::iter(sources)
            .map(|configured| fetch(configured.source.as_ref(), target, &configured.policy))
            .buffered(self.max_in_flight)
            .collect()
            .await
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(4)
    }
}
