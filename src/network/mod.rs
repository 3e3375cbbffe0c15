//! P2P peer management
//!
//! Decides which peers a node talks to and what it believes about them.
//!
//! # Features
//! - Persistent address book with seed peers
//! - Channel registry with per-peer chain state
//! - Version handshake with genesis check and rate-limit negotiation
//! - Sync status exchange and peer-list gossip
//! - Stale peer monitoring and best-peer selection
//! - Acknowledgement-based flow control
//! - Persistent temporary bans for misbehaving peers

pub mod addrman;
pub mod ban;
pub mod chain_state;
pub mod channel;
pub mod clock;
pub mod config;
pub mod flow;
pub mod handshake;
pub mod manager;
pub mod message;
pub mod peer;
pub mod service;
pub mod sync;

pub use addrman::{AddressBook, EndpointError, PeerEndpoint};
pub use ban::BanList;
pub use chain_state::{
    ChainStateError, ChainStateTracker, CumulativeDifficulty, NodeChainState, Staleness,
};
pub use channel::{
    Channel, ChannelCommand, ChannelHandle, ChannelId, ConnectionFactory, FactoryCommand,
    FactoryHandle,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    PeerManagerConfig, BANNED_PEERS_FILENAME, DEFAULT_GENESIS_PREV_HASH, DEFAULT_P2P_PORT,
    DEFAULT_SEED_PEERS, PEERS_FILENAME,
};
pub use flow::{check_acknowledgement, FlowDecision};
pub use handshake::{HandshakeOutcome, HandshakeValidator};
pub use manager::{PeerManager, PeerManagerStats};
pub use message::{
    AckData, ChainStateData, Message, MessageKind, PeerListData, SyncData, SyncState,
    VersionData, SYNCED, UNSYNCED,
};
pub use peer::{ChannelRegistry, RATE_LIMIT_WINDOW};
pub use service::{PeerManagerHandle, PeerManagerService, ServiceError};
pub use sync::{SyncAction, SyncNegotiator};
