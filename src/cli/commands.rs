//! CLI commands for the peer manager
//!
//! Implements the command handlers for the CLI interface.

use crate::network::{
    AddressBook, FactoryCommand, FactoryHandle, PeerManager, PeerManagerConfig,
    PeerManagerService,
};
use crate::storage::PeerStore;
use std::path::Path;
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Build the peer manager configuration from CLI options
///
/// Seeds given on the command line replace the built-in list.
pub fn build_config(
    data_dir: &Path,
    seeds: Vec<String>,
    no_discovery: bool,
    public_port: Option<u16>,
) -> PeerManagerConfig {
    let mut config = PeerManagerConfig::with_data_dir(data_dir);
    if !seeds.is_empty() {
        config.seed_peers = seeds;
    }
    config.enable_peer_discovery = !no_discovery;
    if let Some(port) = public_port {
        config.public_port = port;
    }
    config
}

/// List the address book
pub fn cmd_peers(config: &PeerManagerConfig) -> CliResult<()> {
    let mut book = AddressBook::new(
        PeerStore::new(config.peers_path.clone()),
        config.seed_peers.clone(),
    );
    book.load();

    println!("📒 Known peers ({})", book.len());
    for endpoint in book.endpoints() {
        println!("   {}", endpoint);
    }
    println!("   └─ Stored in {}", config.peers_path.display());

    Ok(())
}

/// Check a single endpoint
pub fn cmd_validate(ip: &str, port: u32) -> bool {
    let valid = AddressBook::validate(ip, port);
    if valid {
        println!("✅ {}:{} is a valid peer address", ip, port);
    } else {
        println!("❌ {}:{} is not a valid peer address", ip, port);
    }
    valid
}

/// Run the peer manager until Ctrl+C
///
/// No transport is attached: connection requests from the manager are
/// logged rather than dialled.
pub async fn cmd_run(config: PeerManagerConfig) -> CliResult<()> {
    let monitor_interval = config.monitor_interval;
    let (factory, mut factory_rx) = FactoryHandle::new();

    let mut manager = PeerManager::new(config, Arc::new(factory));
    manager.load_peer_addresses();
    let seeds: Vec<String> = manager.address_book().endpoints().cloned().collect();

    let (handle, task) = PeerManagerService::spawn(manager, monitor_interval);

    tokio::spawn(async move {
        while let Some(cmd) = factory_rx.recv().await {
            match cmd {
                FactoryCommand::ConnectPeer(endpoint) => log::info!("Dial {}", endpoint),
                FactoryCommand::BanPeer(id) => log::info!("Ban channel {}", id),
                FactoryCommand::SetPeerSynced(id, synced) => {
                    log::info!("Channel {} synced: {}", id, synced)
                }
            }
        }
    });

    println!("🌐 Peer manager running with {} known peers", seeds.len());
    for endpoint in &seeds {
        log::info!("Dial {}", endpoint);
    }

    tokio::signal::ctrl_c().await?;
    println!("\n📴 Shutting down peer manager...");

    let stats = handle.stats().await?;
    handle.shutdown().await;
    task.await?;

    println!("📊 Peer manager stats");
    println!("   ├─ Active channels: {}", stats.active_channels);
    println!("   ├─ Chain states: {}", stats.chain_states);
    println!("   ├─ Known peers: {}", stats.known_peers);
    println!("   └─ Banned peers: {}", stats.banned_peers);

    Ok(())
}
