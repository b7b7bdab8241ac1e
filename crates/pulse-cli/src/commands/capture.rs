use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use pulse_core::config::PulseConfig;
use pulse_core::snapshot::Snapshot;

use crate::targets;

#[derive(Args)]
pub struct CaptureArgs {
    /// Path to a pulse YAML config file; its first target is captured
    #[arg(short, long, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,
    /// MongoDB connection string to capture instead
    #[arg(long, env = "PULSE_MONGO_URL")]
    pub url: Option<String>,
    /// Databases to capture (default: the config scope, else every user database)
    #[arg(short, long = "database", value_delimiter = ',')]
    pub databases: Vec<String>,
    /// Write the snapshot here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: CaptureArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => PulseConfig::from_file(path)?,
        None => PulseConfig::default(),
    };
    let target_config = match &args.url {
        Some(url) => targets::url_target(url),
        None => config
            .targets
            .first()
            .cloned()
            .context("nothing to capture: pass --url or a config with targets")?,
    };
    let databases = if args.databases.is_empty() {
        config.scope.databases.clone()
    } else {
        args.databases.clone()
    };

    let target = targets::open_target(&target_config).await?;
    let snapshot = Snapshot::capture(target.as_ref(), &databases).await;
    tracing::info!(
        endpoint = %snapshot.endpoint,
        queries = snapshot.queries.len(),
        "Captured snapshot"
    );

    let yaml = snapshot.to_yaml()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, yaml)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!(
                "Wrote {} queries to {}",
                snapshot.queries.len(),
                path.display()
            );
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
