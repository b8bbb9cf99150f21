//! WolfSync daemon
//!
//! Watches a sync root, broadcasts local changes to the cluster, and
//! applies changes received from peers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfsync::cluster::Membership;
use wolfsync::config::Config;
use wolfsync::error::Result;
use wolfsync::network::broadcast::Broadcaster;
use wolfsync::network::peer::MeshBroadcaster;
use wolfsync::replication::ReplicationEngine;
use wolfsync::watch::DirectoryWatcher;

/// WolfSync - Distributed Directory Synchronization
#[derive(Parser)]
#[command(name = "wolfsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/wolfsync/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync daemon
    Run {
        /// Override the sync root from the config file
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Broadcast a full-tree resync after startup
        #[arg(long)]
        resync: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "/etc/wolfsync/config.toml")]
        output: PathBuf,

        /// Node ID (defaults to the hostname)
        #[arg(long)]
        node_id: Option<String>,
    },

    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run { root, resync } => run_daemon(cli.config, root, resync).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Status => run_status(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the sync daemon until interrupted
async fn run_daemon(config_path: PathBuf, root: Option<PathBuf>, resync: bool) -> Result<()> {
    let mut config = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
                return Err(e);
            }
        }
    } else {
        tracing::info!("No config file found at {:?}, using defaults", config_path);
        Config::default()
    };
    if let Some(root) = root {
        config.sync.root = root;
    }

    tracing::info!(
        "Starting WolfSync node {} (root {:?})",
        config.node.id,
        config.sync.root
    );

    // Transport first: the engine takes an explicit handle
    let mesh = Arc::new(MeshBroadcaster::new(config.node.id.clone()));
    let bound = match mesh.start(&config.node.bind).await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Failed to start peer mesh on {}: {}", config.node.bind, e);
            return Err(e);
        }
    };
    tracing::info!("Peer mesh bound to {}", bound);

    let membership = Membership::new(&config, Arc::clone(&mesh));
    if let Err(e) = membership.start().await {
        tracing::error!("Failed to start cluster membership: {}", e);
        return Err(e);
    }

    // Root creation failure here is fatal: the node must not come up
    // half-watching a tree it could not create
    let engine = match ReplicationEngine::start(
        config.sync.root.clone(),
        config.node.id.clone(),
        config.suppress_window(),
        Arc::clone(&mesh) as Arc<dyn Broadcaster>,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start replication engine: {}", e);
            return Err(e);
        }
    };

    let _watcher = match DirectoryWatcher::start(&config.sync.root, engine.clone()) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("Failed to watch {:?}: {}", config.sync.root, e);
            return Err(e);
        }
    };

    if resync || config.sync.resync_on_start {
        match engine.sync_all().await {
            Ok(count) => tracing::info!("Startup resync broadcast {} entries", count),
            Err(e) => tracing::warn!("Startup resync failed: {}", e),
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    engine.shutdown();
    membership.stop().await;
    tracing::info!("WolfSync node {} stopped", config.node.id);
    Ok(())
}

/// Write a default configuration file
fn run_init(output: PathBuf, node_id: Option<String>) -> Result<()> {
    let mut config = Config::default();
    if let Some(id) = node_id {
        config.node.id = id;
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.save(&output)?;

    tracing::info!("Wrote configuration to {:?}", output);
    tracing::info!("  node id:   {}", config.node.id);
    tracing::info!("  sync root: {:?}", config.sync.root);
    tracing::info!("Edit the [cluster] section to add peers or a discovery port");
    Ok(())
}

/// Print the effective configuration
fn run_status(config_path: PathBuf) -> Result<()> {
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    println!("WolfSync configuration ({})", config_path.display());
    println!("  Node ID:        {}", config.node.id);
    println!("  Bind:           {}", config.node.bind);
    println!("  Sync root:      {}", config.sync.root.display());
    println!("  Suppress (ms):  {}", config.sync.suppress_ms);
    println!("  Peers:          {:?}", config.cluster.peers);
    match config.cluster.discovery_port {
        Some(port) => println!("  Discovery:      UDP port {}", port),
        None => println!("  Discovery:      disabled"),
    }
    println!("  Status file:    {}", config.node.status_file.display());
    Ok(())
}
