//! Network message types for the peer-management protocol
//!
//! Only the five message kinds the peer manager consumes are defined here:
//! handshake, peer-list gossip, sync status, chain state and flow-control
//! acknowledgements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sync state string a fully synced node advertises
pub const SYNCED: &str = "Synced";

/// Sync state string a node still catching up advertises
pub const UNSYNCED: &str = "Unsynced";

/// Message kinds a channel can be subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Version,
    PeerList,
    Sync,
    ChainState,
    Ack,
}

impl MessageKind {
    /// Every kind the peer manager handles, in registration order
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Version,
        MessageKind::PeerList,
        MessageKind::Sync,
        MessageKind::ChainState,
        MessageKind::Ack,
    ];
}

/// Peer-management messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Handshake: protocol version and network identity
    Version(VersionData),

    /// Gossip of peer IPs reachable at a public port
    PeerList(PeerListData),

    /// "Am I synced" status exchange
    Sync(SyncData),

    /// Self-reported chain summary
    ChainState(ChainStateData),

    /// Flow-control acknowledgement
    Ack(AckData),
}

/// Version handshake payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    /// Node software version; empty means "not yet initialised"
    pub version: String,
    /// Hash preceding the genesis block, identifies the network
    pub genesis_prev_hash: Vec<u8>,
    /// Max messages per minute the sender accepts from a peer
    pub rate_limit: u32,
}

/// Peer list gossip payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerListData {
    pub peer_ips: BTreeSet<String>,
    pub public_port: u32,
}

/// Sync status payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncData {
    pub state: String,
}

impl SyncData {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }

    /// Assert that the sender is synced
    pub fn synced() -> Self {
        Self::new(SYNCED)
    }
}

/// Parsed view of a peer's advertised sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Peer did not say; it is asking us
    Unknown,
    Synced,
    /// "Unsynced" or any other non-empty value
    Unsynced,
}

impl SyncState {
    pub fn parse(state: &str) -> Self {
        match state {
            "" => SyncState::Unknown,
            SYNCED => SyncState::Synced,
            _ => SyncState::Unsynced,
        }
    }
}

/// Chain state payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainStateData {
    pub block_number: u64,
    pub header_hash: Vec<u8>,
    /// Big-endian unsigned integer
    pub cumulative_difficulty: Vec<u8>,
    /// Sender's clock; never trusted locally
    pub timestamp: u64,
}

/// Acknowledgement payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AckData {
    pub bytes_processed: u64,
}

impl Message {
    /// Serialize message to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Version(_) => MessageKind::Version,
            Message::PeerList(_) => MessageKind::PeerList,
            Message::Sync(_) => MessageKind::Sync,
            Message::ChainState(_) => MessageKind::ChainState,
            Message::Ack(_) => MessageKind::Ack,
        }
    }

    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Version(_) => "Version",
            Message::PeerList(_) => "PeerList",
            Message::Sync(_) => "Sync",
            Message::ChainState(_) => "ChainState",
            Message::Ack(_) => "Ack",
        }
    }
}
