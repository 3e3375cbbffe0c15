//! Peer Manager CLI Application
//!
//! A command-line interface for inspecting and running the peer manager.

use clap::{Parser, Subcommand};
use peer_manager::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "peer-manager")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Peer bookkeeping for a blockchain P2P node", long_about = None)]
struct Cli {
    /// Data directory for the peers file
    #[arg(short, long, global = true, default_value = ".peer_data")]
    data_dir: PathBuf,

    /// Seed peer as ip:port; replaces the built-in seeds (repeatable)
    #[arg(short, long = "seed", global = true)]
    seeds: Vec<String>,

    /// Ignore peer lists gossiped by other nodes
    #[arg(long, global = true)]
    no_discovery: bool,

    /// Port advertised to other peers
    #[arg(short, long, global = true)]
    public_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known peer addresses
    Peers,

    /// Check whether an ip and port form a valid peer address
    Validate {
        /// IPv4 address
        ip: String,

        /// Port number
        port: u32,
    },

    /// Run the peer manager until Ctrl+C
    Run,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli::build_config(&cli.data_dir, cli.seeds, cli.no_discovery, cli.public_port);

    match cli.command {
        Commands::Peers => cli::cmd_peers(&config)?,

        Commands::Validate { ip, port } => {
            if !cli::cmd_validate(&ip, port) {
                std::process::exit(1);
            }
        }

        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_run(config))?;
        }
    }

    Ok(())
}
