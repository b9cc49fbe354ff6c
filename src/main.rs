//! # k8s-secrets-engine
//!
//! Issues short-lived Kubernetes ServiceAccount tokens on behalf of named
//! bindings and manages their lease lifecycle.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the operation surface, metrics and probes on :8200
//! k8s-secrets-engine --storage-dir /var/lib/k8s-secrets-engine serve
//!
//! # Replay and clear WAL entries older than the rollback minimum age
//! k8s-secrets-engine --storage-dir /var/lib/k8s-secrets-engine rollback
//!
//! # Try the engine without a cluster
//! k8s-secrets-engine --simulate-cluster serve --port 8200
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use k8s_secrets_engine::backend::Backend;
use k8s_secrets_engine::cluster::{ClusterConnector, KubeConnector, MemoryCluster};
use k8s_secrets_engine::config::ServiceConfig;
use k8s_secrets_engine::issuer::NameGenerator;
use k8s_secrets_engine::observability::metrics;
use k8s_secrets_engine::server::{start_server, ServerState};
use k8s_secrets_engine::storage::{FileStorage, MemoryStorage, Storage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Dynamic Kubernetes ServiceAccount token engine
#[derive(Parser)]
#[command(name = "k8s-secrets-engine", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of the durable store; state is kept in memory when unset
    #[arg(long, global = true, env = "STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Use an in-process cluster instead of the API server in the connection profile
    #[arg(long, global = true)]
    simulate_cluster: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the operation surface over HTTP
    Serve {
        /// Listen port (defaults to LISTEN_PORT or 8200)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Replay and clear uncommitted WAL entries, then exit
    Rollback {
        /// Only replay entries at least this old (defaults to WAL_ROLLBACK_MIN_AGE_SECS or 300)
        #[arg(long)]
        min_age_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env();
    if cli.storage_dir.is_some() {
        config.storage_dir.clone_from(&cli.storage_dir);
    }

    // Must run before any kube client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    init_tracing(&config);

    info!("Starting k8s-secrets-engine");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let backend = Arc::new(build_backend(&config, cli.simulate_cluster).await?);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.listen_port = port;
            }
            serve(config, backend).await
        }
        Commands::Rollback { min_age_secs } => {
            if config.storage_dir.is_none() {
                anyhow::bail!("rollback needs --storage-dir (or STORAGE_DIR)");
            }
            let min_age =
                min_age_secs.map_or_else(|| config.wal_rollback_min_age(), Duration::from_secs);
            let report = backend.rollback(min_age).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failed.is_empty() {
                anyhow::bail!("{} WAL entries could not be replayed", report.failed.len());
            }
            Ok(())
        }
    }
}

fn init_tracing(config: &ServiceConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());

    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_backend(config: &ServiceConfig, simulate_cluster: bool) -> Result<Backend> {
    let storage: Arc<dyn Storage> = match &config.storage_dir {
        Some(dir) => Arc::new(
            FileStorage::open(dir)
                .await
                .with_context(|| format!("Failed to open storage at {}", dir.display()))?,
        ),
        None => {
            warn!("No storage directory configured, state will be lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };

    let connector: Arc<dyn ClusterConnector> = if simulate_cluster {
        warn!("Using the in-process cluster, no Secrets are created in a real cluster");
        Arc::new(MemoryCluster::new())
    } else {
        Arc::new(KubeConnector::default())
    };

    Ok(Backend::builder(storage, connector)
        .poll(config.poll_settings())
        .names(NameGenerator::from_entropy())
        .secret_name_prefix(config.secret_name_prefix.clone())
        .build())
}

async fn serve(config: ServiceConfig, backend: Arc<Backend>) -> Result<()> {
    if config.enable_metrics {
        metrics::register_metrics()?;
    }

    let server_state = Arc::new(ServerState {
        backend,
        is_ready: Arc::new(AtomicBool::new(false)),
        wal_rollback_min_age: config.wal_rollback_min_age(),
    });

    let shutdown = CancellationToken::new();
    let server_handle = tokio::spawn({
        let state = Arc::clone(&server_state);
        let shutdown = shutdown.clone();
        let port = config.listen_port;
        async move {
            if let Err(e) = start_server(port, state, shutdown).await {
                error!("HTTP server error: {}", e);
            }
        }
    });

    server_state.is_ready.store(true, Ordering::Relaxed);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    server_state.is_ready.store(false, Ordering::Relaxed);
    shutdown.cancel();

    server_handle.await.context("HTTP server task panicked")?;
    info!("k8s-secrets-engine stopped");
    Ok(())
}
