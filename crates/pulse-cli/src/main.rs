use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod targets;

#[derive(Parser)]
#[command(
    name = "pulse",
    about = "Pulse - read-only health reports for MongoDB clusters",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        commands::Commands::Report(args) => commands::report::execute(args).await,
        commands::Commands::Capture(args) => commands::capture::execute(args).await,
        commands::Commands::Validate(args) => commands::validate::execute(args).await,
        commands::Commands::ListSources(args) => commands::list_sources::execute(args).await,
    }
}
