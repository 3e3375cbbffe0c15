//! Peer Manager: peer bookkeeping for a blockchain node's P2P layer
//!
//! This crate decides which remote peers a node talks to and what it
//! believes about them:
//! - Persistent address book seeded from a static list
//! - Version handshake with genesis check
//! - Sync status exchange and peer-list gossip
//! - Chain-state tracking with stale peer eviction
//! - Best-peer selection by cumulative difficulty
//! - Acknowledgement-based flow control
//!
//! Transport is out of scope: channels and the connection factory are traits
//! the embedding node implements.
//!
//! # Example
//!
//! ```rust,no_run
//! use peer_manager::network::{FactoryHandle, PeerManager, PeerManagerConfig};
//! use std::sync::Arc;
//!
//! let (factory, _requests) = FactoryHandle::new();
//! let mut manager = PeerManager::new(
//!     PeerManagerConfig::with_data_dir(".peer_data"),
//!     Arc::new(factory),
//! );
//! manager.load_peer_addresses();
//! println!("Known peers: {}", manager.address_book().len());
//! ```

pub mod cli;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use network::{
    AddressBook, Channel, ChannelId, ConnectionFactory, CumulativeDifficulty, Message,
    PeerManager, PeerManagerConfig, PeerManagerHandle, PeerManagerService, PeerManagerStats,
};
pub use storage::{PeerStore, StorageError};
