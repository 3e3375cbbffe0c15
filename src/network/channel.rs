//! Connection-layer capabilities consumed by the peer manager
//!
//! The peer manager never owns a connection. It only sees a [`Channel`]
//! through its [`ChannelId`] and sends it fire-and-forget signals; the
//! connection factory is reached the same way through [`ConnectionFactory`].
//!
//! [`ChannelHandle`] and [`FactoryHandle`] implement both capabilities over
//! unbounded tokio channels so no call ever waits on the connection layer.

use crate::network::message::{Message, MessageKind};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque identifier assigned to a connection when it is accepted or dialled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live peer connection as seen by the peer manager
pub trait Channel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Queue a message for the peer
    fn send(&self, msg: Message);

    /// Release send credit: transmit the next queued outbound message
    fn send_next(&self);

    /// Ask the connection layer to drop this connection
    fn disconnect(&self);

    /// Subscribe the peer manager to one inbound message kind
    fn register(&self, kind: MessageKind);

    /// Bytes transmitted but not yet acknowledged
    fn bytes_sent(&self) -> u64;

    /// Subtract acknowledged bytes from the in-flight counter
    fn acknowledge(&self, bytes_processed: u64);

    /// Our address on this connection
    fn host_ip(&self) -> &str;

    /// The remote address as observed on this connection
    fn peer_ip(&self) -> &str;
}

/// Capabilities of the layer that creates and tracks connections
pub trait ConnectionFactory: Send + Sync {
    fn ban_peer(&self, channel: ChannelId);

    /// Dial an `ip:port` endpoint
    fn connect_peer(&self, endpoint: &str);

    fn set_peer_synced(&self, channel: ChannelId, synced: bool);

    /// Whether the local node considers itself synced
    fn is_synced(&self) -> bool;
}

/// Signals emitted by a [`ChannelHandle`]
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    Send(Message),
    SendNext,
    Disconnect,
    Register(MessageKind),
}

/// Handle for signalling a peer connection
#[derive(Clone)]
pub struct ChannelHandle {
    id: ChannelId,
    host_ip: String,
    peer_ip: String,
    bytes_sent: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    /// Create a handle and the receiver the connection task drains
    pub fn new(
        id: ChannelId,
        host_ip: impl Into<String>,
        peer_ip: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id,
            host_ip: host_ip.into(),
            peer_ip: peer_ip.into(),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            tx,
        };
        (handle, rx)
    }

    /// Shared in-flight counter, for the writer side of the connection
    pub fn bytes_sent_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_sent)
    }

    fn signal(&self, cmd: ChannelCommand) {
        if self.tx.send(cmd).is_err() {
            log::debug!("Channel {} already closed", self.id);
        }
    }
}

impl Channel for ChannelHandle {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn send(&self, msg: Message) {
        match msg.to_bytes() {
            Ok(bytes) => {
                self.bytes_sent
                    .fetch_add(bytes.len() as u64, Ordering::SeqCst);
            }
            Err(e) => log::warn!("Failed to size {} for {}: {}", msg.type_name(), self.id, e),
        }
        self.signal(ChannelCommand::Send(msg));
    }

    fn send_next(&self) {
        self.signal(ChannelCommand::SendNext);
    }

    fn disconnect(&self) {
        self.signal(ChannelCommand::Disconnect);
    }

    fn register(&self, kind: MessageKind) {
        self.signal(ChannelCommand::Register(kind));
    }

    fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::SeqCst)
    }

    fn acknowledge(&self, bytes_processed: u64) {
        // Saturating: a concurrent writer may not have counted yet
        let _ = self
            .bytes_sent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |sent| {
                Some(sent.saturating_sub(bytes_processed))
            });
    }

    fn host_ip(&self) -> &str {
        &self.host_ip
    }

    fn peer_ip(&self) -> &str {
        &self.peer_ip
    }
}

/// Signals emitted by a [`FactoryHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryCommand {
    BanPeer(ChannelId),
    ConnectPeer(String),
    SetPeerSynced(ChannelId, bool),
}

/// Handle for signalling the connection factory
#[derive(Clone)]
pub struct FactoryHandle {
    synced: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<FactoryCommand>,
}

impl FactoryHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FactoryCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            synced: Arc::new(AtomicBool::new(false)),
            tx,
        };
        (handle, rx)
    }

    /// Update the local node's own sync status
    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    fn signal(&self, cmd: FactoryCommand) {
        if self.tx.send(cmd).is_err() {
            log::debug!("Connection factory receiver dropped");
        }
    }
}

impl ConnectionFactory for FactoryHandle {
    fn ban_peer(&self, channel: ChannelId) {
        self.signal(FactoryCommand::BanPeer(channel));
    }

    fn connect_peer(&self, endpoint: &str) {
        self.signal(FactoryCommand::ConnectPeer(endpoint.to_string()));
    }

    fn set_peer_synced(&self, channel: ChannelId, synced: bool) {
        self.signal(FactoryCommand::SetPeerSynced(channel, synced));
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}
