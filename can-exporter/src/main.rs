//! CAN Signal Exporter
//!
//! Reads frames from a CAN bus, decodes them with DBC definitions from the
//! can-signal-decoder library and serves the latest value of every signal as
//! Prometheus gauges on `/metrics`.

use anyhow::{Context, Result};
use can_signal_decoder::{
    open_transport, Decoder, MetricRegistry, Pipeline, ShutdownSignal, TransportKind,
};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod server;

use config::AppConfig;

/// CAN Signal Exporter - publish decoded CAN signals for Prometheus
#[derive(Parser, Debug)]
#[command(name = "can-exporter")]
#[command(about = "Decode live CAN traffic with DBC files and export signals to Prometheus", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (exporter.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to DBC file(s) (can be repeated, appended after the config file's list)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Bus backend: socketcan or virtual
    #[arg(short, long, value_name = "TYPE")]
    interface: Option<TransportKind>,

    /// Bus channel, e.g. can0 or vcan0
    #[arg(long, value_name = "NAME")]
    channel: Option<String>,

    /// Port for the /metrics endpoint
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Command-line flags win over the config file
    fn apply(&self, config: &mut AppConfig) {
        config.schema.dbc_files.extend(self.dbc.iter().cloned());
        if let Some(interface) = self.interface {
            config.transport.interface = interface;
        }
        if let Some(channel) = &self.channel {
            config.transport.channel = channel.clone();
        }
        if let Some(port) = self.port {
            config.metrics.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };
    args.apply(&mut config);

    init_logging(log_level(&config, args.verbose, args.quiet)?);

    log::info!("CAN Signal Exporter v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_signal_decoder::VERSION);

    config.validate()?;
    run(config).await
}

async fn run(config: AppConfig) -> Result<()> {
    let decoder = Decoder::from_dbc_files(&config.schema.dbc_files)
        .context("Failed to load DBC files")?;
    let stats = decoder.catalog_stats();
    log::info!(
        "Signal catalog: {} messages, {} signals, {} multiplexed",
        stats.num_messages,
        stats.num_signals,
        stats.num_multiplexed
    );

    let catalog = Arc::new(decoder.into_catalog());
    let registry = Arc::new(MetricRegistry::new());

    let addr = config.metrics.socket_addr();
    let listener = server::bind(addr).await?;
    log::info!("Prometheus metrics available at http://{}/metrics", addr);
    let server = tokio::spawn(server::serve(listener, Arc::clone(&registry)));

    let transport = open_transport(config.transport.interface, &config.transport.channel)
        .with_context(|| format!("Cannot open {} transport", config.transport.interface))?;
    let mut pipeline = Pipeline::new(transport, catalog, registry, config.pipeline_config());

    let shutdown = ShutdownSignal::new();
    let mut ingest = tokio::task::spawn_blocking({
        let shutdown = shutdown.clone();
        move || pipeline.run(&shutdown)
    });

    let outcome = tokio::select! {
        joined = &mut ingest => joined,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupt received, draining");
            shutdown.trigger();
            ingest.await
        }
    };

    server.abort();
    let stats = outcome.context("Ingest task panicked")??;
    log::info!("Exited cleanly after {} frames", stats.frames_received);
    Ok(())
}

/// Resolve the log level: -q and -v override the config file
fn log_level(config: &AppConfig, verbose: u8, quiet: bool) -> Result<LevelFilter> {
    if quiet {
        return Ok(LevelFilter::Error);
    }
    Ok(match verbose {
        0 => config.level_filter()?,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    })
}

/// Initialize logging at the given level
fn init_logging(level: LevelFilter) {
    use env_logger::Builder;
    use std::io::Write;

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
