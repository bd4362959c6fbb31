use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use marketbus_messaging::{BusConfig, load_config};
use marketbus_runner::{Simulation, SimulationConfig};

/// Runs the simulated provider and storage services against each other
#[derive(Debug, Parser)]
#[command(name = "marketbus-sim", version)]
struct Args {
    /// Substrate configuration (JSON), defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Live ticks published per stream
    #[arg(long, default_value_t = 20)]
    ticks: usize,

    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    /// Seed for a reproducible feed
    #[arg(long)]
    seed: Option<u64>,

    /// Symbols to stream and fetch
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bus = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {}", path.display());
            load_config(path)?
        }
        None => BusConfig::default(),
    };

    let mut config = SimulationConfig {
        agents: bus.default_agents,
        bus,
        seed: args.seed,
        ticks: args.ticks,
        tick_interval: Duration::from_millis(args.interval_ms),
        ..Default::default()
    };
    if !args.symbols.is_empty() {
        config.symbols = args.symbols;
    }

    let simulation = Simulation::start(config).await?;
    let report = simulation.run().await;
    println!(
        "streamed {} stored {} fetched {} served {}",
        report.streamed, report.stored, report.fetched, report.served
    );
    simulation.shutdown().await?;

    match report.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
