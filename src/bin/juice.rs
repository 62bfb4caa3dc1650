//! JuiceDollar scenario simulator
//!
//! Runs scripted scenarios against a fresh engine, prints protocol
//! parameters and inspects persisted engine snapshots.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use juicedollar::cli::{
    persist, position_views, restore, OutputFormat, OutputFormatter, ProtocolSummary, Scenario,
    SimulatorConfig,
};

/// JuiceDollar simulator - collateralized stablecoin engine
#[derive(Parser)]
#[command(name = "juice")]
#[command(version = juicedollar::VERSION)]
#[command(about = "Scenario simulator for the JuiceDollar engine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Simulator configuration file
    #[arg(short, long, env = "JUICE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (text, json, json-pretty)
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file against a fresh engine
    Simulate {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Persist the final engine state into the data directory
        #[arg(short, long)]
        persist: bool,
    },

    /// Print or write protocol parameters
    Params {
        /// Write to this file instead of printing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a persisted engine
    Inspect {
        /// Data directory; defaults to the configured one
        data_dir: Option<PathBuf>,

        /// Also list the most recent events
        #[arg(short, long, default_value = "0")]
        events: usize,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(2);
        }
    };

    let default_level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let output = OutputFormatter::new(cli.format.unwrap_or(config.format));
    if let Err(e) = run_command(&cli, &config, &output) {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SimulatorConfig> {
    let config = match &cli.config {
        Some(path) => SimulatorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let path = SimulatorConfig::default_path();
            if path.exists() {
                SimulatorConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?
            } else {
                SimulatorConfig::default()
            }
        }
    };
    let config = config.with_env();
    config.validate()?;
    Ok(config)
}

fn run_command(cli: &Cli, config: &SimulatorConfig, output: &OutputFormatter) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Simulate { scenario, persist } => cmd_simulate(config, output, scenario, *persist),
        Commands::Params { output: path } => cmd_params(config, output, path.as_ref()),
        Commands::Inspect { data_dir, events } => {
            let dir = data_dir.clone().unwrap_or_else(|| config.data_dir.clone());
            cmd_inspect(output, &dir, *events)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_simulate(
    config: &SimulatorConfig,
    output: &OutputFormatter,
    path: &PathBuf,
    persist_state: bool,
) -> anyhow::Result<()> {
    let scenario =
        Scenario::load(path).with_context(|| format!("loading scenario {}", path.display()))?;
    let params = config.protocol_params()?;
    let mut protocol = scenario.genesis(params, config.leadrate_ppm)?;

    output.info(&format!("Running scenario '{}'", scenario.name));
    let report = scenario.run(&mut protocol);

    if matches!(output.format(), OutputFormat::Text) {
        for outcome in &report.outcomes {
            let mark = if outcome.passed {
                style("✓").green()
            } else {
                style("✗").red()
            };
            match &outcome.error {
                Some(error) => println!("{} [{}] {}: {}", mark, outcome.index, outcome.label, error),
                None => println!("{} [{}] {}", mark, outcome.index, outcome.label),
            }
        }
        output.section("Protocol");
        output.summary(&ProtocolSummary::new(&protocol));
        output.section("Positions");
        output.positions(&position_views(&protocol));
    } else {
        output.data(&report);
    }

    if persist_state {
        persist(&protocol, &config.data_dir)
            .with_context(|| format!("persisting to {}", config.data_dir.display()))?;
        output.success(&format!("State saved to {}", config.data_dir.display()));
    }

    match report.first_failure() {
        Some(failure) => anyhow::bail!(
            "scenario '{}' failed at step {} ({})",
            report.name,
            failure.index,
            failure.label
        ),
        None => {
            output.success(&format!(
                "Scenario '{}' passed ({} steps)",
                report.name, report.total_steps
            ));
            Ok(())
        }
    }
}

fn cmd_params(
    config: &SimulatorConfig,
    output: &OutputFormatter,
    path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let params = config.protocol_params()?;
    match path {
        Some(path) => {
            params
                .save(path)
                .with_context(|| format!("writing {}", path.display()))?;
            output.success(&format!("Parameters written to {}", path.display()));
        }
        None => output.data(&params),
    }
    Ok(())
}

fn cmd_inspect(output: &OutputFormatter, dir: &PathBuf, events: usize) -> anyhow::Result<()> {
    if !dir.exists() {
        anyhow::bail!("data directory {} does not exist", dir.display());
    }
    let protocol = restore(dir).with_context(|| format!("loading state from {}", dir.display()))?;

    output.section("Protocol");
    output.summary(&ProtocolSummary::new(&protocol));
    output.section("Positions");
    output.positions(&position_views(&protocol));

    if events > 0 {
        output.section("Events");
        let recent: Vec<_> = protocol.events().recent(events).collect();
        output.data(&recent);
    }
    Ok(())
}
