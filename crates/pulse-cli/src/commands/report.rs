use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use pulse_core::config::PulseConfig;
use pulse_core::event::TracingEventSink;
use pulse_core::pipeline::Pipeline;
use pulse_core::report::{render, OutputFormat, Report};
use pulse_core::subsystem::Subsystem;

use crate::targets;

/// Exit status when no source of any target could be read.
const EXIT_TOTAL_FAILURE: i32 = 2;

#[derive(Args)]
pub struct ReportArgs {
    /// Path to a pulse YAML config file
    #[arg(short, long, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,
    /// MongoDB connection string; replaces the configured targets
    #[arg(long, env = "PULSE_MONGO_URL", conflicts_with = "snapshot")]
    pub url: Option<String>,
    /// Replay a captured snapshot instead of contacting a server
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// Subsystems to report on, in report order
    #[arg(short, long = "subsystem", value_delimiter = ',')]
    pub subsystems: Vec<Subsystem>,
    /// Databases to inspect (default: every user database)
    #[arg(short, long = "database", value_delimiter = ',')]
    pub databases: Vec<String>,
    /// Output format: text, json or yaml
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
    /// Maximum number of sources queried at once
    #[arg(long)]
    pub max_in_flight: Option<usize>,
    /// Per-attempt deadline for each source, e.g. 5s or 1500ms
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl ReportArgs {
    /// Config file settings with command line overrides applied.
    fn resolve_config(&self) -> anyhow::Result<PulseConfig> {
        let mut config = match &self.config {
            Some(path) => PulseConfig::from_file(path)?,
            None => PulseConfig::default(),
        };
        if let Some(url) = &self.url {
            config.targets = vec![targets::url_target(url)];
        }
        if let Some(path) = &self.snapshot {
            config.targets = vec![targets::snapshot_target(path)];
        }
        if !self.subsystems.is_empty() {
            config.subsystems = self.subsystems.clone();
        }
        if !self.databases.is_empty() {
            config.scope.databases = self.databases.clone();
        }
        if let Some(n) = self.max_in_flight {
            config.collector.max_in_flight = n;
        }
        if let Some(timeout) = self.timeout {
            config.collector.timeout = timeout;
        }
        Ok(config)
    }
}

pub async fn execute(args: ReportArgs) -> anyhow::Result<()> {
    let config = args.resolve_config()?;
    let mut pipeline = Pipeline::from_config(&config)?;
    pipeline.add_event_sink(Arc::new(TracingEventSink));

    tracing::info!(
        targets = config.targets.len(),
        sources = pipeline.sources().len(),
        "Loaded configuration"
    );

    // Settings errors stop the run before any target is contacted.
    for (i, target_config) in config.targets.iter().enumerate() {
        targets::check_target(target_config)
            .with_context(|| format!("invalid {}", targets::label(target_config, i)))?;
    }

    let mut reports = Vec::with_capacity(config.targets.len());
    for (i, target_config) in config.targets.iter().enumerate() {
        let name = targets::label(target_config, i);
        let report = match targets::open_target(target_config).await {
            Ok(target) => {
                tracing::info!(target = %name, endpoint = %target.endpoint(), "Collecting");
                pipeline.run(target.as_ref()).await
            }
            Err(e) => {
                tracing::error!(target = %name, error = %e, "Target could not be opened");
                pipeline.unreachable_report(&targets::endpoint(target_config), &e)
            }
        };
        if report.is_total_failure() {
            tracing::error!(
                target = %name,
                failures = report.failures().len(),
                "Every source failed"
            );
        }
        reports.push(report);
    }

    println!("{}", render_all(&reports, args.format)?.trim_end());

    if reports.iter().all(Report::is_total_failure) {
        std::process::exit(EXIT_TOTAL_FAILURE);
    }
    Ok(())
}

fn render_all(reports: &[Report], format: OutputFormat) -> anyhow::Result<String> {
    match (format, reports) {
        (_, [single]) => Ok(render(single, format)?),
        (OutputFormat::Json, _) => Ok(serde_json::to_string_pretty(reports)?),
        (OutputFormat::Yaml, _) => Ok(reports
            .iter()
            .map(|r| render(r, format))
            .collect::<Result<Vec<_>, _>>()?
            .join("---\n")),
        (OutputFormat::Text, _) => Ok(reports
            .iter()
            .map(|r| render(r, format))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n")),
    }
}
