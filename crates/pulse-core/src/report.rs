use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{DiagError, DiagResult};
use crate::evaluate::{Finding, Severity};
use crate::source::{FetchFailure, RawResult};
use crate::subsystem::Subsystem;

/// Timing and outcome of one source in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub subsystem: Subsystem,
    pub success: bool,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub attempts: u32,
    pub metrics: usize,
}

/// A source that could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub subsystem: Subsystem,
    pub error: FetchFailure,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// A source whose answer was unusable in whole or in part: a payload the
/// normalizer could not map, or a database it could not read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingIssue {
    pub source: String,
    pub subsystem: Subsystem,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemSection {
    pub subsystem: Subsystem,
    pub findings: Vec<Finding>,
}

/// Result of one collection cycle against one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    cycle_id: Uuid,
    endpoint: String,
    started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    duration: Duration,
    /// Sources were configured and none of them could be fetched.
    total_failure: bool,
    sources: Vec<SourceOutcome>,
    failures: Vec<SourceFailure>,
    mapping_errors: Vec<MappingIssue>,
    sections: Vec<SubsystemSection>,
}

impl Report {
    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn sources(&self) -> &[SourceOutcome] {
        &self.sources
    }

    pub fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }

    pub fn mapping_errors(&self) -> &[MappingIssue] {
        &self.mapping_errors
    }

    /// Subsystem -> findings, in configured subsystem order.
    pub fn sections(&self) -> &[SubsystemSection] {
        &self.sections
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.sections.iter().flat_map(|s| s.findings.iter())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings().filter(|f| f.severity == severity).count()
    }

    pub fn worst_severity(&self) -> Severity {
        self.findings()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    /// True when sources were configured and none of them could be fetched.
    pub fn is_total_failure(&self) -> bool {
        self.total_failure
    }
}

/// Assembles a [`Report`]; sorting happens once in [`ReportBuilder::build`].
pub struct ReportBuilder {
    cycle_id: Uuid,
    endpoint: String,
    started_at: DateTime<Utc>,
    subsystem_order: Vec<Subsystem>,
    sources: Vec<SourceOutcome>,
    failures: Vec<SourceFailure>,
    mapping_errors: Vec<MappingIssue>,
    findings: Vec<Finding>,
}

impl ReportBuilder {
    pub fn new(endpoint: impl Into<String>, subsystem_order: &[Subsystem]) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            endpoint: endpoint.into(),
            started_at: Utc::now(),
            subsystem_order: subsystem_order.to_vec(),
            sources: Vec::new(),
            failures: Vec::new(),
            mapping_errors: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn cycle_id(mut self, cycle_id: Uuid) -> Self {
        self.cycle_id = cycle_id;
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Record the outcome of a fetch; failed fetches also land in the
    /// failure list.
    pub fn record_source(&mut self, raw: &RawResult, metrics: usize) {
        self.sources.push(SourceOutcome {
            source: raw.source_id.clone(),
            subsystem: raw.subsystem,
            success: raw.is_success(),
            elapsed: raw.elapsed,
            attempts: raw.attempts,
            metrics,
        });
        if let Err(failure) = &raw.outcome {
            self.failures.push(SourceFailure {
                source: raw.source_id.clone(),
                subsystem: raw.subsystem,
                error: failure.clone(),
                elapsed: raw.elapsed,
            });
        }
    }

    pub fn mapping_error(&mut self, raw: &RawResult, detail: impl Into<String>) {
        self.mapping_errors.push(MappingIssue {
            source: raw.source_id.clone(),
            subsystem: raw.subsystem,
            detail: detail.into(),
        });
    }

    pub fn finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn build(self, duration: Duration) -> Report {
        let mut order = self.subsystem_order;
        for subsystem in Subsystem::ALL {
            let present = self.findings.iter().any(|f| f.metric.subsystem == subsystem);
            if present && !order.contains(&subsystem) {
                order.push(subsystem);
            }
        }

        let mut findings = self.findings;
        findings.sort_by(|a, b| {
            a.metric
                .name
                .cmp(&b.metric.name)
                .then_with(|| a.metric.label_string().cmp(&b.metric.label_string()))
        });

        let sections = order
            .into_iter()
            .map(|subsystem| SubsystemSection {
                subsystem,
                findings: findings
                    .iter()
                    .filter(|f| f.metric.subsystem == subsystem)
                    .cloned()
                    .collect(),
            })
            .collect();

        let total_failure = !self.sources.is_empty() && self.sources.iter().all(|s| !s.success);

        Report {
            cycle_id: self.cycle_id,
            endpoint: self.endpoint,
            started_at: self.started_at,
            duration,
            total_failure,
            sources: self.sources,
            failures: self.failures,
            mapping_errors: self.mapping_errors,
            sections,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!("unknown format '{other}' (expected text, json or yaml)")),
        }
    }
}

/// Render a report. Same report and format always give the same output.
pub fn render(report: &Report, format: OutputFormat) -> DiagResult<String> {
    match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).map_err(|e| DiagError::Other(e.into()))
        }
        OutputFormat::Yaml => serde_yaml::to_string(report).map_err(|e| DiagError::Other(e.into())),
    }
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        if millis > 0 {
            format!("{mins}m {secs}.{millis:03}s")
        } else {
            format!("{mins}m {secs}s")
        }
    } else {
        let millis = d.as_millis();
        if millis < 1000 {
            format!("{millis}ms")
        } else {
            format!("{}.{}s", total_secs, d.subsec_millis() / 100)
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bar = "=".repeat(72);
        let thin = "-".repeat(72);

        writeln!(f, "\n{bar}")?;
        writeln!(f, "  CLUSTER HEALTH REPORT")?;
        writeln!(f, "{bar}\n")?;

        writeln!(f, "  Endpoint: {}", self.endpoint)?;
        writeln!(f, "  Cycle:    {}", self.cycle_id)?;
        writeln!(
            f,
            "  Started:  {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f, "  Duration: {}", format_duration(self.duration))?;
        writeln!(
            f,
            "  Sources:  {} collected, {} failed",
            self.sources.len(),
            self.failures.len()
        )?;
        writeln!(
            f,
            "  Findings: {} ({} critical, {} warn, {} ok)",
            self.findings().count(),
            self.count(Severity::Critical),
            self.count(Severity::Warn),
            self.count(Severity::Ok)
        )?;

        if self.total_failure {
            writeln!(
                f,
                "\n  {} ALL SOURCES FAILED: no diagnostics could be collected",
                Severity::Critical.glyph()
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "\n{thin}")?;
            writeln!(f, "  FAILED SOURCES ({})", self.failures.len())?;
            writeln!(f, "{thin}\n")?;
            for failure in &self.failures {
                writeln!(
                    f,
                    "  {:<30} {:<10} {}",
                    failure.source,
                    format_duration(failure.elapsed),
                    failure.error
                )?;
            }
        }

        if !self.mapping_errors.is_empty() {
            writeln!(f, "\n{thin}")?;
            writeln!(f, "  INCOMPLETE RESPONSES ({})", self.mapping_errors.len())?;
            writeln!(f, "{thin}\n")?;
            for issue in &self.mapping_errors {
                writeln!(f, "  {:<30} {}", issue.source, issue.detail)?;
            }
        }

        for section in &self.sections {
            writeln!(f, "\n{thin}")?;
            writeln!(
                f,
                "  {} ({})",
                section.subsystem.as_str().to_uppercase(),
                section.findings.len()
            )?;
            writeln!(f, "{thin}\n")?;
            if section.findings.is_empty() {
                writeln!(f, "  (none)")?;
                continue;
            }
            for finding in &section.findings {
                let metric = &finding.metric;
                let mark = if finding.has_anomaly() { "!" } else { " " };
                let value = format!("{}{}", metric.value, metric.unit.suffix());
                writeln!(
                    f,
                    "  {}{} {:<28} {:<12} {}",
                    finding.severity.glyph(),
                    mark,
                    metric.name,
                    value,
                    metric.label_string()
                )?;
                if let Some(ref anomaly) = metric.anomaly {
                    writeln!(f, "       !! {anomaly}")?;
                }
                if let Some(ref rec) = finding.recommendation {
                    writeln!(f, "       -> {rec}")?;
                }
            }
        }

        writeln!(f, "\n{thin}")?;
        writeln!(f, "  SOURCES ({})", self.sources.len())?;
        writeln!(f, "{thin}\n")?;
        if self.sources.is_empty() {
            writeln!(f, "  (none)")?;
        } else {
            writeln!(
                f,
                "  {:<4} {:<30} {:<8} {:<8} {}",
                "#", "SOURCE", "RESULT", "METRICS", "DURATION"
            )?;
            for (i, s) in self.sources.iter().enumerate() {
                let result = if s.success { "OK" } else { "FAILED" };
                writeln!(
                    f,
                    "  {:<4} {:<30} {:<8} {:<8} {}",
                    i + 1,
                    s.source,
                    result,
                    s.metrics,
                    format_duration(s.elapsed)
                )?;
            }
        }

        writeln!(f, "\n{bar}")?;

        Ok(())
    }
}
