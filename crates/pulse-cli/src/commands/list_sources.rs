use clap::Args;

use pulse_core::sources::builtin_descriptors;
use pulse_core::subsystem::Subsystem;

#[derive(Args)]
pub struct ListSourcesArgs {
    /// Only sources of these subsystems
    #[arg(short, long = "subsystem", value_delimiter = ',')]
    pub subsystems: Vec<Subsystem>,
}

pub async fn execute(args: ListSourcesArgs) -> anyhow::Result<()> {
    println!("{:<30} {:<12} {}", "SOURCE", "SUBSYSTEM", "DESCRIPTION");
    println!("{}", "-".repeat(80));

    for desc in builtin_descriptors() {
        if !args.subsystems.is_empty() && !args.subsystems.contains(&desc.subsystem) {
            continue;
        }
        println!("{:<30} {:<12} {}", desc.id, desc.subsystem, desc.description);
    }

    Ok(())
}
