//! Crash Stream Server
//!
//! Runs the WebSocket stream server and offline dataset tools:
//! provably-fair verification, summaries, manual entry and model fitting.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use crash_stream::{
    config::ServerConfig,
    core::{fair, StreamRng, DEFAULT_HOUSE_EDGE},
    network::CrashServer,
    stats::{best_by_aic, fit_models, fit_report, summarize},
    store::{parse_multiplier_list, JsonFileStore, SampleStore, MANUAL_LABEL},
    VERSION,
};

/// Draws printed by `simulate`.
const SIMULATE_PREVIEW: usize = 20;

/// Crash multiplier collector and live stream server.
#[derive(Parser, Debug)]
#[command(name = "crash-stream", version, about = "Crash multiplier streams and dataset tools")]
struct Cli {
    /// Data directory holding main.json (overrides CRASH_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket stream server
    Serve {
        /// Bind address (overrides CRASH_BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Maximum concurrent connections (overrides CRASH_MAX_CONNECTIONS)
        #[arg(long)]
        max_connections: Option<usize>,
    },

    /// Provably fair: compute crash multipliers from seeds
    Pf {
        /// Server seed
        #[arg(long)]
        server: String,

        /// Client seed
        #[arg(long)]
        client: String,

        /// Starting nonce
        #[arg(long, default_value_t = 0)]
        nonce: u64,

        /// Number of rounds to generate
        #[arg(long, default_value_t = 1)]
        rounds: u64,

        /// House edge factor
        #[arg(long, default_value_t = DEFAULT_HOUSE_EDGE)]
        edge: f64,
    },

    /// Print dataset summary statistics as JSON
    Summary,

    /// Append multipliers (e.g. `2.95x 1.00x`) to the dataset
    Add {
        /// Multipliers to append; values below 1 are dropped
        #[arg(long, num_args = 1.., required = true)]
        values: Vec<String>,

        /// Session label to store
        #[arg(long, default_value = MANUAL_LABEL)]
        session: String,
    },

    /// Fit candidate models to the dataset
    Fit,

    /// Compute P(X >= x) with the best model
    Prob {
        /// Thresholds
        #[arg(long, num_args = 1.., required = true)]
        x: Vec<f64>,
    },

    /// Simulate rounds from the best model
    Simulate {
        /// Number of draws
        #[arg(long, default_value_t = 1000)]
        n: usize,
    },
}

fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    let mut config = ServerConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }

    match cli.command {
        Command::Serve { bind, max_connections } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(max) = max_connections {
                config.max_connections = max;
            }
            serve(config).await
        }
        Command::Pf { server, client, nonce, rounds, edge } => {
            if !(edge > 0.0 && edge < 1.0) {
                bail!("--edge must be in (0, 1), got {}", edge);
            }
            for (i, r) in fair::sequence(&server, &client, nonce, rounds, edge).iter().enumerate() {
                println!("nonce={}  R={:.4}x", nonce.wrapping_add(i as u64), r);
            }
            Ok(())
        }
        Command::Summary => {
            let store = JsonFileStore::new(config.data.data_dir);
            let stats = summarize(&store.load_sample());
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Add { values, session } => {
            let store = JsonFileStore::new(config.data.data_dir);
            let parsed = parse_multiplier_list(&values.join(" "));
            let receipt = store
                .append_batch(&parsed, &session)
                .with_context(|| format!("appending to {}", store.main_path().display()))?;
            println!("Appended {} values to {}.", receipt.added, store.main_path().display());
            Ok(())
        }
        Command::Fit => {
            let models = load_models(&config.data.data_dir)?;
            println!("{}", fit_report(&models));
            Ok(())
        }
        Command::Prob { x } => {
            let models = load_models(&config.data.data_dir)?;
            let best = best_by_aic(&models).context("no model fitted")?;
            for t in x {
                println!("P(X>= {}) = {:.6}", t, best.survival(t));
            }
            Ok(())
        }
        Command::Simulate { n } => {
            let models = load_models(&config.data.data_dir)?;
            let best = best_by_aic(&models).context("no model fitted")?;
            let draws = best.simulate(n, &mut StreamRng::from_entropy());
            let preview: Vec<String> = draws
                .iter()
                .take(SIMULATE_PREVIEW)
                .map(|v| format!("{:.4}", v))
                .collect();
            println!("Simulated samples (first {}): [{}]", preview.len(), preview.join(" "));
            Ok(())
        }
    }
}

fn load_models(data_dir: &std::path::Path) -> anyhow::Result<Vec<crash_stream::stats::FittedModel>> {
    let store = JsonFileStore::new(data_dir);
    let sample = store.load_sample();
    fit_models(&sample).with_context(|| format!("fitting {}", store.main_path().display()))
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    info!("Crash Stream Server v{}", VERSION);
    info!("Data directory: {}", config.data.data_dir.display());
    info!(
        "Stream defaults: step {}, period {:?}, survival period {:?}",
        config.stream.step, config.stream.period, config.stream.survival_period
    );

    let server = std::sync::Arc::new(CrashServer::with_json_store(config));

    let running = server.clone();
    let mut task = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = &mut task => {
            result.context("server task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            server.shutdown();
            task.await.context("server task panicked")??;
        }
    }

    Ok(())
}
