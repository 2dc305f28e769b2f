use autoplant::cli::{Cli, Commands};
use autoplant::config::AppConfig;
use anyhow::{Context, Result};
use autoplant::error::PlantError;
use autoplant::protocol::{address, Content};
use autoplant::sim::Plant;
use std::path::Path;
use tokio::time::Duration;
use tracing::info;

use crate::main_runtime::{init_logging, init_logging_simple, shutdown_signal};

pub(crate) async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run {
            config,
            duration_secs,
            seed,
            report,
        } => run_plant(config, *duration_secs, *seed, *report).await,
        Commands::Decode { text } => {
            init_logging_simple();
            decode(text)
        }
        Commands::Config { config } => {
            init_logging_simple();
            let config = AppConfig::load_from(config)
                .with_context(|| format!("loading configuration from {}", config.display()))?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_plant(
    config_dir: &Path,
    duration_secs: Option<u64>,
    seed: Option<u64>,
    report: bool,
) -> Result<()> {
    let mut config = AppConfig::load_from(config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;
    if seed.is_some() {
        config.seed = seed;
    }
    config.validate().map_err(PlantError::InvalidConfig)?;

    init_logging(&config.logging);
    info!(
        config_dir = %config_dir.display(),
        seed = ?config.seed,
        sites = config.topology.sites.len(),
        units = config.topology.units.len(),
        "starting plant"
    );

    let plant = Plant::launch(&config).context("launching plant")?;

    match duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "run duration elapsed");
                }
                _ = shutdown_signal() => info!("shutdown signal received"),
            }
        }
        None => {
            shutdown_signal().await;
            info!("shutdown signal received");
        }
    }

    if report {
        let mut names = vec![address::SUPERVISOR.to_string()];
        names.extend(config.topology.sites.iter().map(|s| address::coordinator(s)));
        for name in names {
            let snapshot = plant
                .report(&name)
                .await
                .with_context(|| format!("collecting report from {name}"))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    plant.shutdown().await;
    Ok(())
}

fn decode(text: &str) -> Result<()> {
    let content = Content::decode(text)?;
    println!("performative: {}", content.performative());
    println!("keyword:      {}", content.keyword());
    println!("encoded:      {}", content.encode());
    println!("{}", serde_json::to_string_pretty(&content)?);
    Ok(())
}
