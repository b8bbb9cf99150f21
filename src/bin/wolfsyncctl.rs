//! WolfSyncCtl - Control utility for WolfSync
//!
//! Usage:
//!   wolfsyncctl status        - Show node status from the running service
//!   wolfsyncctl list peers    - List known peers
//!   wolfsyncctl stats         - Live node statistics

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use wolfsync::cluster::ClusterStatus;

/// WolfSync Cluster Control Tool
#[derive(Parser)]
#[command(name = "wolfsyncctl")]
#[command(about = "Control and monitor WolfSync nodes", long_about = None)]
struct Cli {
    /// Path to status file (written by the running wolfsync service)
    #[arg(short, long, default_value = "/var/lib/wolfsync/status.json")]
    status_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show status of the local node
    Status,
    /// List cluster peers and their status
    List {
        #[command(subcommand)]
        what: ListSubcommand,
    },
    /// Show live stats (updates every second)
    Stats,
}

#[derive(Subcommand)]
enum ListSubcommand {
    /// List all known peers
    Peers,
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Status => show_status(&cli.status_file),
        Commands::List { what } => match what {
            ListSubcommand::Peers => list_peers(&cli.status_file),
        },
        Commands::Stats => show_stats(&cli.status_file),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn read_status(path: &PathBuf) -> Result<ClusterStatus, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!(
            "Status file not found: {}\n\nIs the wolfsync service running?\nStart it with: sudo systemctl start wolfsync",
            path.display()
        )
        .into());
    }

    let content = std::fs::read_to_string(path)?;
    let status: ClusterStatus = serde_json::from_str(&content)?;

    // Check if status is stale (more than 10 seconds old)
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if now.saturating_sub(status.updated_at) > 10 {
        return Err("Status file is stale. Is the wolfsync service running?".into());
    }

    Ok(status)
}

fn show_status(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let status = read_status(path)?;

    println!();
    println!("WolfSync Status");
    println!("===============");
    println!();
    println!("Node ID:      {}", status.node_id);
    println!("Bind Address: {}", status.bind_address);
    println!("Sync Root:    {}", status.sync_root.display());
    println!("Peers:        {}", status.peers.len());
    println!();

    Ok(())
}

fn list_peers(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let status = read_status(path)?;

    let connected = status.peers.iter().filter(|p| p.connected).count();

    println!();
    println!("WolfSync Cluster Peers");
    println!("======================");
    println!();
    println!(
        "Total: {} peers  |  Connected: {}",
        status.peers.len(),
        connected
    );
    println!();
    println!("{:20} {:25} {:10}", "NODE ID", "ADDRESS", "STATUS");
    println!("{}", "-".repeat(55));

    for peer in &status.peers {
        let peer_status = if peer.connected {
            "Connected"
        } else {
            "Unreachable"
        };
        println!("{:20} {:25} {:10}", peer.node_id, peer.address, peer_status);
    }

    println!();

    Ok(())
}

fn show_stats(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("WolfSync Live Stats (Ctrl+C to exit)");
    println!();

    loop {
        // Clear screen
        print!("\x1B[2J\x1B[1;1H");

        match read_status(path) {
            Ok(status) => {
                println!("Node:  {}", status.node_id);
                println!("Root:  {}", status.sync_root.display());
                println!("Peers: {}", status.peers.len());
                println!();

                for peer in &status.peers {
                    let indicator = if peer.connected { "●" } else { "○" };
                    println!(
                        "  {} {} at {} (seen {}s ago)",
                        indicator, peer.node_id, peer.address, peer.last_seen_secs_ago
                    );
                }
            }
            Err(e) => {
                println!("Error reading status: {}", e);
            }
        }

        std::thread::sleep(Duration::from_secs(1));
    }
}
