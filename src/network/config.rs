//! Peer manager configuration
//!
//! Injected once at construction; nothing reads configuration globally.

use std::path::PathBuf;
use std::time::Duration;

/// Hash preceding the genesis block on the main network
pub const DEFAULT_GENESIS_PREV_HASH: &[u8] = b"Outside Context Problem";

/// Default P2P port, both for seeds and our advertised public port
pub const DEFAULT_P2P_PORT: u16 = 9000;

/// Default peers file name inside the data directory
pub const PEERS_FILENAME: &str = "peers.txt";

/// Default ban list file name inside the data directory
pub const BANNED_PEERS_FILENAME: &str = "banned_peers.txt";

/// Bootstrap peers for the main network
pub const DEFAULT_SEED_PEERS: &[&str] = &[
    "104.251.219.215:9000",
    "104.251.219.145:9000",
    "104.251.219.40:9000",
    "104.237.3.185:9000",
    "35.177.60.137:9000",
];

/// Peer manager configuration
#[derive(Debug, Clone)]
pub struct PeerManagerConfig {
    /// Static `ip:port` seeds merged into the address book on every load
    pub seed_peers: Vec<String>,
    /// Learn new peers from peer-list gossip
    pub enable_peer_discovery: bool,
    /// Max age of a peer's last chain-state report
    pub chain_state_timeout: Duration,
    /// Max messages per minute accepted from one peer
    pub peer_rate_limit: u32,
    /// How long a misbehaving peer stays banned
    pub ban_duration: Duration,
    /// Where the address book is persisted
    pub peers_path: PathBuf,
    /// Where active bans are persisted
    pub banned_peers_path: PathBuf,
    /// Our software version, sent in handshakes
    pub version: String,
    pub genesis_prev_hash: Vec<u8>,
    /// Port other nodes reach us on
    pub public_port: u16,
    /// Period of the chain-state staleness scan
    pub monitor_interval: Duration,
    /// Max IPs advertised in one peer-list message
    pub max_peer_list_size: usize,
}

impl PeerManagerConfig {
    /// Default configuration with the address book stored under `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            peers_path: data_dir.join(PEERS_FILENAME),
            banned_peers_path: data_dir.join(BANNED_PEERS_FILENAME),
            ..Default::default()
        }
    }
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            seed_peers: DEFAULT_SEED_PEERS.iter().map(|s| s.to_string()).collect(),
            enable_peer_discovery: true,
            chain_state_timeout: Duration::from_secs(180),
            peer_rate_limit: 500,
            ban_duration: Duration::from_secs(20 * 60),
            peers_path: PathBuf::from(".peer_data").join(PEERS_FILENAME),
            banned_peers_path: PathBuf::from(".peer_data").join(BANNED_PEERS_FILENAME),
            version: env!("CARGO_PKG_VERSION").to_string(),
            genesis_prev_hash: DEFAULT_GENESIS_PREV_HASH.to_vec(),
            public_port: DEFAULT_P2P_PORT,
            monitor_interval: Duration::from_secs(30),
            max_peer_list_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PeerManagerConfig::default();
        assert_eq!(config.seed_peers.len(), 5);
        assert!(config.enable_peer_discovery);
        assert_eq!(config.chain_state_timeout.as_secs(), 180);
        assert_eq!(config.peer_rate_limit, 500);
        assert_eq!(config.ban_duration.as_secs(), 1200);
    }

    #[test]
    fn test_with_data_dir() {
        let config = PeerManagerConfig::with_data_dir("/tmp/node");
        assert_eq!(config.peers_path, PathBuf::from("/tmp/node/peers.txt"));
        assert_eq!(
            config.banned_peers_path,
            PathBuf::from("/tmp/node/banned_peers.txt")
        );
    }
}
