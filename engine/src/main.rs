//! hostpulse engine main entry point
//!
//! Samples host telemetry on a fixed cadence, scores composite health,
//! raises deduplicated threshold alerts, and optionally runs best-effort
//! optimization actions on critical breaches.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hostpulse_engine::{
    config::EngineConfig,
    error::{ConfigError, Result},
    optimize::{OptimizationActuator, OptimizationKind},
    sampler::SamplerEngine,
    source::default_sources,
};

/// hostpulse command line interface
#[derive(Parser)]
#[command(name = "hostpulse")]
#[command(about = "Host telemetry sampling and alerting engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the sampling engine until interrupted
    Run {
        /// Print every published snapshot instead of logging it
        #[arg(long)]
        print_snapshots: bool,
    },

    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },

    /// Run one optimization action and print the outcome
    Optimize {
        /// Action to run
        #[arg(value_enum, default_value_t = OptimizationKind::All)]
        action: OptimizationKind,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    initialize_logging(&cli);

    // Load configuration
    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    let result = match &cli.command {
        Some(Commands::Run { print_snapshots }) => run_engine(config, *print_snapshots).await,
        Some(Commands::Config { show }) => handle_config(config, *show),
        Some(Commands::Optimize { action }) => run_optimization(*action),
        None => run_engine(config, false).await, // Default to run
    };

    match result {
        Ok(_) => {
            info!("Command completed successfully");
        }
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

/// Initialize logging from CLI flags, honoring RUST_LOG when set
fn initialize_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "hostpulse={level},hostpulse_engine={level},tokio=warn,mio=warn",
            level = cli.log_level.to_lowercase()
        ))
    });

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

/// Load configuration from file, default locations, or defaults
fn load_configuration(cli: &Cli) -> Result<EngineConfig> {
    let config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path.display());
        EngineConfig::from_file(config_path)?
    } else {
        let default_path = EngineConfig::default_config_path()?;
        if default_path.exists() {
            info!("Loading configuration from: {}", default_path.display());
            EngineConfig::from_file(&default_path)?
        } else {
            info!("Using default configuration");
            EngineConfig::load_with_fallback::<PathBuf>(None)?
        }
    };

    Ok(config)
}

/// Run the engine until a shutdown signal arrives
async fn run_engine(config: EngineConfig, print_snapshots: bool) -> Result<()> {
    info!(
        interval_ms = config.sampling.interval_ms,
        auto_optimize = config.optimization.auto,
        "Starting hostpulse engine"
    );

    let sources = default_sources();
    let mut engine = SamplerEngine::new(config, sources)?;
    let mut snapshots = engine.subscribe();

    engine.start(None).await?;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Snapshot channel closed");
                    break;
                }
                let summary = snapshots.borrow().as_ref().map(|s| s.summary());
                if let Some(summary) = summary {
                    if print_snapshots {
                        println!("{}", summary);
                    } else {
                        info!("{}", summary);
                    }
                }
            }
        }
    }

    info!("Initiating graceful shutdown");
    engine.stop().await?;

    if let Some(snapshot) = engine.latest_snapshot() {
        info!(
            ticks = snapshot.stats.ticks_completed,
            alerts = snapshot.stats.alerts_emitted,
            "Engine stopped"
        );
    }

    Ok(())
}

/// Validate and optionally display the effective configuration
fn handle_config(config: EngineConfig, show: bool) -> Result<()> {
    config.validate()?;
    println!("Configuration is valid");

    if show {
        let rendered =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ValidationFailed {
                reason: e.to_string(),
            })?;
        println!("{}", rendered);
    }

    Ok(())
}

/// Run one optimization action outside the sampling loop
fn run_optimization(action: OptimizationKind) -> Result<()> {
    let mut actuator = OptimizationActuator::new();
    let result = actuator.run(action);

    println!(
        "{}: {} ({})",
        result.kind,
        result.description,
        if result.succeeded { "ok" } else { "failed" }
    );
    if let Some(improvement) = result.improvement {
        println!("Estimated improvement: {:.0}%", improvement.percent());
    }

    Ok(())
}
