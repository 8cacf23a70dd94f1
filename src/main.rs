//! Faultline CLI - Main entry point.

use faultline::cli::{Cli, Commands};
use faultline::config::ExperimentConfig;
use faultline::events::ExperimentOutcome;
use faultline::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let load = |path: &std::path::Path| -> anyhow::Result<ExperimentConfig> {
        let mut config = ExperimentConfig::from_file(path)?;
        if let Some(level) = &cli.log_level {
            config.observability.log_level = level.clone();
        }
        config.observability.json_logs |= cli.json_logs;
        Ok(config)
    };

    match &cli.command {
        Commands::Run {
            config,
            result_file,
        } => {
            let mut config = load(config)?;
            if let Some(path) = result_file {
                config.result_file = Some(path.clone());
            }

            let summary = faultline::run(config).await?;
            if summary.outcome != ExperimentOutcome::Passed {
                std::process::exit(1);
            }
        }

        Commands::Validate { config } => {
            let config = load(config)?;
            println!(
                "Experiment '{}' is valid: {} probe(s), chaos duration {:?}",
                config.name,
                config.probes.len(),
                config.chaos_duration
            );
        }

        Commands::Probe { config, name } => {
            let config = load(config)?;
            observability::init(&config.observability)?;

            let lifecycle = faultline::build_lifecycle(&config).await?;
            match lifecycle.scheduler().run_probe(name).await {
                Ok(output) => {
                    println!("Probe '{}' passed", name);
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                }
                Err(e) => {
                    eprintln!("Probe '{}' failed: {}", name, e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("faultline {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
