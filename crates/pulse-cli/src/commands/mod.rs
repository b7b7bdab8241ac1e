use clap::Subcommand;

pub mod capture;
pub mod list_sources;
pub mod report;
pub mod validate;

#[derive(Subcommand)]
pub enum Commands {
    /// Collect diagnostics and print a health report per target
    Report(report::ReportArgs),
    /// Record a target's query responses into a snapshot file
    Capture(capture::CaptureArgs),
    /// Validate a config file without contacting any target
    Validate(validate::ValidateArgs),
    /// List the built-in metric sources
    ListSources(list_sources::ListSourcesArgs),
}
