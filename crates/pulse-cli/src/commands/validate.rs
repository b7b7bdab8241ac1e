use std::path::PathBuf;

use clap::Args;

use pulse_core::config::PulseConfig;

use crate::targets;

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to config file to validate
    pub config: PathBuf,
}

pub async fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    println!("Validating {}...", args.config.display());

    let config = PulseConfig::from_file(&args.config)?;
    println!("  YAML parsing: OK");
    println!("  Targets found: {}", config.targets.len());
    let subsystems: Vec<&str> = config.subsystems.iter().map(|s| s.as_str()).collect();
    println!("  Subsystems: {}", subsystems.join(", "));

    let mut errors = Vec::new();

    match config.validate() {
        Ok(()) => {
            println!("  Settings: OK");
            for configured in config.configured_sources() {
                let policy = &configured.policy;
                println!(
                    "    Source '{}': timeout {}, attempts {}",
                    configured.source.descriptor().id,
                    humantime::format_duration(policy.timeout),
                    policy.max_attempts
                );
            }
        }
        Err(e) => {
            println!("  Settings: INVALID - {e}");
            errors.push(e.to_string());
        }
    }

    for (i, target) in config.targets.iter().enumerate() {
        let name = targets::label(target, i);
        match targets::check_target(target) {
            Ok(()) => println!("  Target '{name}': OK"),
            Err(e) => {
                println!("  Target '{name}': INVALID - {e}");
                errors.push(format!("Target '{name}': {e}"));
            }
        }
    }

    println!();
    if errors.is_empty() {
        println!("Validation PASSED");
    } else {
        println!("Validation FAILED with {} error(s):", errors.len());
        for err in &errors {
            eprintln!("  - {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
