use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::collector::{Collector, ConfiguredSource};
use crate::config::PulseConfig;
use crate::error::{DiagError, DiagResult};
use crate::evaluate::{evaluate, ThresholdTable};
use crate::event::{CycleEvent, EventSink};
use crate::normalize::{partial_failures, try_normalize};
use crate::report::{Report, ReportBuilder};
use crate::source::{FetchFailure, RawResult};
use crate::subsystem::Subsystem;
use crate::target::ClusterTarget;

/// Collect -> normalize -> evaluate -> report, for one target at a time.
pub struct Pipeline {
    sources: Vec<ConfiguredSource>,
    subsystems: Vec<Subsystem>,
    thresholds: ThresholdTable,
    collector: Collector,
    event_sinks: Vec<Arc<dyn EventSink>>,
}

impl Pipeline {
    pub fn new(
        sources: Vec<ConfiguredSource>,
        subsystems: Vec<Subsystem>,
        thresholds: ThresholdTable,
        collector: Collector,
    ) -> Self {
        Self {
            sources,
            subsystems,
            thresholds,
            collector,
            event_sinks: Vec::new(),
        }
    }

    /// Validates `config` first; an invalid config never starts a cycle.
    pub fn from_config(config: &PulseConfig) -> DiagResult<Self> {
        config.validate()?;
        Ok(Self::new(
            config.configured_sources(),
            config.subsystems.clone(),
            config.threshold_table()?,
            Collector::new(config.collector.max_in_flight),
        ))
    }

    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.event_sinks.push(sink);
    }

    pub fn sources(&self) -> &[ConfiguredSource] {
        &self.sources
    }

    async fn emit(&self, event: CycleEvent) {
        for sink in &self.event_sinks {
            sink.emit(event.clone()).await;
        }
    }

    /// Run one cycle. Always produces a report; source failures are data.
    pub async fn run(&self, target: &dyn ClusterTarget) -> Report {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = tokio::time::Instant::now();

        self.emit(CycleEvent::Started {
            cycle_id,
            endpoint: target.endpoint().to_string(),
            sources: self.sources.len(),
            at: started_at,
        })
        .await;

        let raw_results = self.collector.collect(target, &self.sources).await;

        let mut builder = ReportBuilder::new(target.endpoint(), &self.subsystems)
            .cycle_id(cycle_id)
            .started_at(started_at);

        for raw in raw_results {
            self.emit(CycleEvent::SourceCompleted {
                cycle_id,
                source_id: raw.source_id.clone(),
                success: raw.is_success(),
                elapsed: raw.elapsed,
            })
            .await;

            let metrics = match try_normalize(&raw) {
                Ok(metrics) => metrics,
                Err(e) => {
                    tracing::warn!(
                        source = %raw.source_id,
                        subsystem = %raw.subsystem,
                        error = %e,
                        "Response could not be mapped, metrics omitted"
                    );
                    builder.mapping_error(&raw, e.to_string());
                    Vec::new()
                }
            };

            for detail in partial_failures(&raw) {
                builder.mapping_error(&raw, detail);
            }

            builder.record_source(&raw, metrics.len());
            for metric in metrics {
                builder.finding(evaluate(metric, &self.thresholds));
            }
        }

        let report = builder.build(clock.elapsed());

        tracing::info!(
            endpoint = %report.endpoint(),
            findings = report.findings().count(),
            failures = report.failures().len(),
            worst = %report.worst_severity(),
            "Collection cycle complete"
        );

        self.emit(CycleEvent::Completed {
            cycle_id,
            findings: report.findings().count(),
            failures: report.failures().len(),
            duration: report.duration(),
        })
        .await;

        report
    }

    /// Report for a target that could not be opened: every configured
    /// source is recorded as failed with `error`.
    pub fn unreachable_report(&self, endpoint: &str, error: &DiagError) -> Report {
        let failure = FetchFailure::from(error);
        let now = Utc::now();
        let mut builder = ReportBuilder::new(endpoint, &self.subsystems).started_at(now);
        for configured in &self.sources {
            let descriptor = configured.source.descriptor();
            let raw = RawResult {
                source_id: descriptor.id,
                subsystem: descriptor.subsystem,
                kind: descriptor.kind,
                fetched_at: now,
                elapsed: Duration::ZERO,
                attempts: 0,
                outcome: Err(failure.clone()),
            };
            builder.record_source(&raw, 0);
        }

        tracing::warn!(
            endpoint,
            error = %error,
            "Target could not be opened, every source marked failed"
        );
        builder.build(Duration::ZERO)
    }
}
