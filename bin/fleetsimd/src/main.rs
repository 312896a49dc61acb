//! ---
//! fleetsim_section: "01-core-functionality"
//! fleetsim_subsection: "binary"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Binary entrypoint for the fleet telemetry simulator."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use fleetsim_common::config::{ConfigError, FleetConfig};
use fleetsim_common::logging::init_tracing;
use fleetsim_engine::{CountingSink, MetricSink, RoleSignalGenerator, RunSummary, SimulationLoop};
use fleetsim_metrics::{new_registry, serve_metrics, SimulatorMetrics};
use fleetsim_remote_write::RemoteWriteSink;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "configs/fleetsim.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("fleetsim ", env!("CARGO_PKG_VERSION")),
    about = "Fleet CPU-utilization telemetry simulator",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        allow_negative_numbers = true,
        help = "Number of ticks to simulate"
    )]
    iterations: Option<i64>,

    #[arg(long, help = "Run until interrupted", conflicts_with = "iterations")]
    unbounded: bool,

    #[arg(long, help = "Seed for the signal generator")]
    seed: Option<u64>,

    #[arg(long, value_name = "URL", help = "Remote-write endpoint")]
    endpoint: Option<Url>,

    #[arg(long, help = "Keep batches in memory instead of pushing them")]
    dry_run: bool,
}

impl Cli {
    fn apply(&self, config: &mut FleetConfig) {
        if let Some(iterations) = self.iterations {
            config.simulation.iterations = Some(iterations);
            config.simulation.unbounded = false;
        }
        if self.unbounded {
            config.simulation.unbounded = true;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(endpoint) = &self.endpoint {
            config.remote_write.url = endpoint.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG_PATH));

    let load_started = Instant::now();
    let (mut config, config_source) = match FleetConfig::load_with_source(&candidates) {
        Ok(loaded) => (loaded.config, Some(loaded.source)),
        Err(ConfigError::NotFound(_)) if cli.config.is_none() => (FleetConfig::default(), None),
        Err(err) => return Err(err).context("failed to load configuration"),
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    init_tracing("fleetsimd", &config.logging)?;
    match &config_source {
        Some(path) => info!(
            config_path = %path.display(),
            elapsed_ms = load_started.elapsed().as_millis() as u64,
            "configuration loaded"
        ),
        None => info!("no configuration file found; using built-in defaults"),
    }

    let registry = new_registry();
    let metrics = SimulatorMetrics::new(registry.clone())?;
    let exporter = if config.metrics.enabled {
        Some(serve_metrics(registry, config.metrics.listen).await?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let dry_run = CountingSink::new();
    let sink: Box<dyn MetricSink> = if cli.dry_run {
        info!("dry run; batches are counted and discarded");
        Box::new(dry_run.clone())
    } else {
        info!(endpoint = %config.remote_write.url, "pushing to remote-write endpoint");
        Box::new(RemoteWriteSink::new(&config.remote_write)?)
    };

    info!(
        seed = config.simulation.seed,
        servers = config.servers.len(),
        initial_primary = config.initial_primary().unwrap_or_default(),
        threshold = config.failover.threshold,
        cooldown_ticks = config.failover.cooldown_ticks,
        job = %config.simulation.job,
        "simulation configured"
    );
    let source = RoleSignalGenerator::seeded(config.simulation.seed);
    let mut simulation = SimulationLoop::from_config(&config, source, sink)
        .context("failed to build simulation")?
        .with_metrics(metrics);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received; stopping after the current tick");
                let _ = shutdown_tx.send(());
            }
            Err(err) => warn!(error = %err, "failed to listen for ctrl-c"),
        }
    });

    let summary = simulation.run(Some(shutdown_rx)).await;
    render_summary(&summary, cli.dry_run.then_some(&dry_run));

    if let Some(exporter) = exporter {
        exporter.shutdown().await?;
    }
    Ok(())
}

fn render_summary(summary: &RunSummary, dry_run: Option<&CountingSink>) {
    println!(
        "Ticks: {}\nFailovers: {}\nEmission failures: {}\nActive primary: {}",
        summary.ticks,
        summary.failovers.len(),
        summary.emission_failures,
        summary.active_primary
    );
    for event in &summary.failovers {
        println!(
            "  tick {}: {} -> {} (load {})",
            event.tick, event.demoted, event.promoted, event.load
        );
    }
    if let Some(dry_run) = dry_run {
        println!(
            "Batches discarded: {} ({} samples)",
            dry_run.batches(),
            dry_run.samples()
        );
    }
    if summary.cancelled {
        println!("Run cancelled before reaching its iteration limit");
    }
}
