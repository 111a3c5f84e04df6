//! Prometheus scrape endpoint for MQTT sensor readings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use sensorscrape_common::{MqttBroker, ReadingStore, init_tracing};
use sensorscrape_exporter::{
    AcquisitionCoordinator, ExporterConfig, ExpositionAdapter, HttpServer, SeriesSpec, watch_loop,
};

/// Serve fresh MQTT sensor readings as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "sensorscrape-exporter")]
#[command(about = "Serve fresh MQTT sensor readings as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "sensorscrape.json5")]
    config: PathBuf,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides config).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the scrape endpoint (default).
    Serve,
    /// Refresh every reading in a loop and log it, without serving HTTP.
    Watch {
        /// Pause between rounds.
        #[arg(long, default_value_t = 3)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; nothing is served with an incomplete mapping
    let mut config = ExporterConfig::load_from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("{}: {}", args.config.display(), e))?;

    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
        config.validate()?;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        "Starting sensorscrape exporter"
    );

    let pairs = config.pairs()?;
    let store = Arc::new(ReadingStore::new(
        pairs.iter().map(|p| p.key.clone()),
        config.acquisition.default_value.trim(),
    ));
    let coordinator = Arc::new(AcquisitionCoordinator::new(
        MqttBroker::new(config.broker.clone()),
        store,
        config.acquisition.mode,
    ));
    let series = config.series.iter().cloned().map(SeriesSpec::from).collect();
    let adapter = Arc::new(ExpositionAdapter::new(
        coordinator.clone(),
        pairs,
        config.acquisition.timeout(),
        series,
    ));

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let command = args.command.unwrap_or(Command::Serve);
    let mut worker: JoinHandle<anyhow::Result<()>> = match command {
        Command::Serve => {
            let listen_addr: SocketAddr = config
                .prometheus
                .listen
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
            let server = HttpServer::new(adapter, listen_addr, config.prometheus.path.clone());

            tokio::spawn(server.run(shutdown_rx))
        }
        Command::Watch { interval_secs } => tokio::spawn(async move {
            watch_loop(adapter, Duration::from_secs(interval_secs), shutdown_rx).await;
            Ok(())
        }),
    };

    // Wait for shutdown signal or for the worker to stop on its own
    let outcome = tokio::select! {
        _ = wait_for_signal() => {
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(Duration::from_secs(5), &mut worker).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Worker did not stop within 5s, aborting");
                    worker.abort();
                    Ok(Ok(()))
                }
            }
        }
        joined = &mut worker => {
            info!("Worker stopped");
            joined
        }
    };

    let stats = coordinator.stats();
    info!(
        rounds = stats.rounds,
        acquisitions_ok = stats.acquisitions_ok,
        acquisitions_failed = stats.acquisitions_failed(),
        timeouts = stats.timeouts,
        connection_errors = stats.connection_errors,
        "Final statistics"
    );

    // A worker that failed (e.g. the listener could not bind) fails the process
    outcome??;

    info!("Exporter stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
