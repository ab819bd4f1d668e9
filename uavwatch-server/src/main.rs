// UAVWatch Server - Telemetry producer, trainer and scoring API
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # UAVWatch
//!
//! Command-line entry point for the telemetry pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Generate an offline dataset and train on it
//! uavwatch generate --out data/telemetry_data.csv --cycles 30
//! uavwatch train --csv data/telemetry_data.csv --model-dir models
//!
//! # Stream live telemetry into SQLite
//! uavwatch produce --database data/uav_telemetry.db
//!
//! # Serve the scoring API (optionally with an in-process producer)
//! uavwatch serve --port 5000 --with-producer
//! ```

mod api;
mod config;
mod error;
mod metrics;
mod produce;
mod train;

use clap::{Parser, Subcommand};
use config::AppConfig;
use error::ServerError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use uavwatch::{ModelBundle, Scorer, SqliteStore, TelemetryService};
use uavwatch_sim::{generate_batch, BatchConfig};

/// UAV telemetry simulation and novelty scoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Model artifact directory (overrides the config file)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream simulated telemetry into the database
    Produce {
        /// Milliseconds between records
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many records
        #[arg(long)]
        limit: Option<u64>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate a batch dataset as CSV
    Generate {
        /// Output CSV path
        #[arg(short, long, default_value = "data/telemetry_data.csv")]
        out: PathBuf,

        #[arg(long, default_value = "30")]
        cycles: usize,

        #[arg(long, default_value = "600")]
        points_per_cycle: usize,

        #[arg(long, default_value = "0.2")]
        anomaly_ratio: f64,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Also write a JSON summary next to the CSV
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Fit scaler and classifier from a batch CSV
    Train {
        #[arg(long, default_value = "data/telemetry_data.csv")]
        csv: PathBuf,

        /// Upper bound on training rows
        #[arg(long, default_value = "5000")]
        max_samples: usize,

        #[arg(long, default_value = "20")]
        n_neighbors: usize,

        /// Expected outlier share; the default offset is used when absent
        #[arg(long)]
        contamination: Option<f64>,
    },

    /// Serve the scoring API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Run the producer in the same process
        #[arg(long)]
        with_producer: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("UAVWatch v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(model_dir) = args.model_dir {
        config.model_dir = model_dir;
    }

    match args.command {
        Command::Produce {
            interval_ms,
            limit,
            seed,
        } => {
            if let Some(ms) = interval_ms {
                config.producer_interval_ms = ms;
            }
            ensure_parent(&config.database_path)?;
            let store = SqliteStore::open(&config.database_path)?;
            produce::run(&config, store, produce::ProduceOptions { limit, seed }).await?;
        }

        Command::Generate {
            out,
            cycles,
            points_per_cycle,
            anomaly_ratio,
            seed,
            summary,
        } => {
            let batch_config = BatchConfig::default()
                .with_cycles(cycles)
                .with_points_per_cycle(points_per_cycle)
                .with_anomaly_ratio(anomaly_ratio)
                .with_seed(seed);
            let batch = generate_batch(&batch_config);
            ensure_parent(&out)?;
            batch.to_csv(&out)?;

            let s = batch.summary();
            info!("Generated {} rows into {}", s.total_rows, out.display());
            info!(
                "Anomalies: {} of {} targeted ({:.1}%)",
                s.actual_anomalies,
                s.target_anomalies,
                s.anomaly_ratio * 100.0
            );
            for (event, count) in &s.distribution {
                info!("  {}: {}", event, count);
            }
            if let Some(path) = summary {
                s.to_json(path)?;
            }
        }

        Command::Train {
            csv,
            max_samples,
            n_neighbors,
            contamination,
        } => {
            let options = train::TrainOptions {
                max_samples,
                n_neighbors,
                contamination,
                ..train::TrainOptions::new(csv, config.model_dir.clone())
            };
            let report = train::run(&options)?;
            info!(
                "Trained on {} rows ({} nominal of {})",
                report.training_rows, report.nominal_rows, report.total_rows
            );
        }

        Command::Serve {
            port,
            with_producer,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config, with_producer).await?;
        }
    }

    Ok(())
}

async fn serve(config: AppConfig, with_producer: bool) -> Result<(), ServerError> {
    // Artifacts are validated once; a bad bundle never reaches the scoring path.
    let bundle = ModelBundle::load(&config.model_dir)?;
    info!(
        "Model loaded from {} ({} features)",
        config.model_dir.display(),
        bundle.features().len()
    );
    metrics::register_all();

    if with_producer {
        ensure_parent(&config.database_path)?;
        let store = SqliteStore::open(&config.database_path)?;
        let producer_config = config.clone();
        tokio::spawn(async move {
            let options = produce::ProduceOptions::default();
            if let Err(e) = produce::run(&producer_config, store, options).await {
                error!("Producer stopped: {}", e);
            }
        });
    }

    let store = SqliteStore::open_read_only(&config.database_path)?;
    let service = Arc::new(TelemetryService::new(
        store,
        Scorer::new(Arc::new(bundle)),
        config.service(),
    ));
    let app = api::router(service);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn ensure_parent(path: &std::path::Path) -> Result<(), ServerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
