//! Tiered memory service
//!
//! Standalone entry point: loads configuration from the environment,
//! brings up the embedding model and file storage, and serves the memory
//! engine over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tiermem::embedding::FastembedProvider;
use tiermem::engine::{EngineConfig, MemoryEngine};
use tiermem::service::{run_service, ServiceState};
use tiermem::storage::FileStorage;

/// Configuration for the memory service
struct ServiceConfig {
    /// Directory holding snapshots, weights, and the correction log
    data_dir: String,
    /// Listen port
    port: String,
    /// Classifier RNG seed
    rng_seed: u64,
    /// Hours between decay sweeps (0 disables the background sweep)
    decay_interval_hours: u64,
}

impl ServiceConfig {
    fn from_env() -> Self {
        Self {
            data_dir: std::env::var("TIERMEM_DATA_DIR")
                .unwrap_or_else(|_| "tiermem-data".to_string()),
            port: std::env::var("TIERMEM_PORT").unwrap_or_else(|_| "3001".to_string()),
            rng_seed: std::env::var("TIERMEM_RNG_SEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(42),
            decay_interval_hours: std::env::var("TIERMEM_DECAY_INTERVAL_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    println!("\n{}", "═".repeat(60));
    println!("🧠 tiermem v0.3.0");
    println!("{}", "═".repeat(60));
    println!("Layers: Identity | Experience | Knowledge");
    println!("{}\n", "═".repeat(60));

    let config = ServiceConfig::from_env();

    let storage = Arc::new(FileStorage::open(&config.data_dir)?);
    let embeddings = Arc::new(FastembedProvider::new());
    let engine = MemoryEngine::new(
        embeddings,
        storage,
        EngineConfig {
            rng_seed: config.rng_seed,
            ..EngineConfig::default()
        },
    );

    info!("Initializing memory engine (data dir: {})", config.data_dir);
    engine.init().await?;

    let state = Arc::new(ServiceState { engine });

    // Background decay sweep
    if config.decay_interval_hours > 0 {
        let sweep_state = state.clone();
        let interval = std::time::Duration::from_secs(config.decay_interval_hours * 3600);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                match sweep_state.engine.apply_decay().await {
                    Ok(updated) => info!("Decay sweep complete ({updated} entries updated)"),
                    Err(e) => tracing::warn!("Decay sweep failed: {e}"),
                }
            }
        });
    }

    let addr = format!("0.0.0.0:{}", config.port);
    run_service(state, &addr).await
}
