//! Peer manager
//!
//! Facade over the address book, channel registry and protocol checks. Every
//! inbound message for a registered channel goes through
//! [`PeerManager::handle_message`], which dispatches on the message kind.
//! All reactions are signals to the channel or the connection factory; no
//! handler blocks.
//!
//! The manager is a plain single-owner value. Run it inside
//! [`crate::network::service::PeerManagerService`] to share it between tasks.

use crate::network::addrman::AddressBook;
use crate::network::ban::BanList;
use crate::network::chain_state::{ChainStateTracker, CumulativeDifficulty, Staleness};
use crate::network::channel::{Channel, ChannelId, ConnectionFactory};
use crate::network::clock::{Clock, SystemClock};
use crate::network::config::PeerManagerConfig;
use crate::network::flow::{check_acknowledgement, FlowDecision};
use crate::network::handshake::{HandshakeOutcome, HandshakeValidator};
use crate::network::message::{
    AckData, ChainStateData, Message, PeerListData, SyncData, VersionData,
};
use crate::network::peer::ChannelRegistry;
use crate::network::sync::{SyncAction, SyncNegotiator};
use crate::storage::PeerStore;
use std::sync::Arc;

/// Snapshot of peer manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerManagerStats {
    pub active_channels: usize,
    pub chain_states: usize,
    pub known_peers: usize,
    pub banned_peers: usize,
}

/// Tracks peers, their chain state and the address book
pub struct PeerManager {
    config: PeerManagerConfig,
    registry: ChannelRegistry,
    address_book: AddressBook,
    handshake: HandshakeValidator,
    sync: SyncNegotiator,
    tracker: ChainStateTracker,
    bans: BanList,
    factory: Arc<dyn ConnectionFactory>,
    clock: Arc<dyn Clock>,
}

impl PeerManager {
    /// Create a peer manager on the wall clock
    pub fn new(config: PeerManagerConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self::with_clock(config, factory, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: PeerManagerConfig,
        factory: Arc<dyn ConnectionFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let address_book = AddressBook::new(
            PeerStore::new(config.peers_path.clone()),
            config.seed_peers.clone(),
        );
        let handshake = HandshakeValidator::new(
            config.version.clone(),
            config.genesis_prev_hash.clone(),
            config.peer_rate_limit,
        );

        Self {
            registry: ChannelRegistry::new(config.peer_rate_limit),
            address_book,
            handshake,
            sync: SyncNegotiator::new(config.enable_peer_discovery),
            tracker: ChainStateTracker::new(config.chain_state_timeout),
            bans: BanList::with_store(
                config.ban_duration,
                PeerStore::new(config.banned_peers_path.clone()),
            ),
            factory,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PeerManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    /// Load the persisted address book and ban list, and merge the seeds
    pub fn load_peer_addresses(&mut self) {
        self.address_book.load();
        self.bans.load(self.clock.now());
    }

    /// Wait until every pending write of the peers and ban files has landed
    pub async fn flush(&self) {
        self.address_book.flush().await;
        self.bans.flush().await;
    }

    /// Merge endpoints into the address book and dial the new ones
    pub fn update_peer_addresses<I>(&mut self, endpoints: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let now = self.clock.now();
        self.address_book
            .update(endpoints, self.factory.as_ref(), &self.bans, now)
    }

    // =========================================================================
    // Channel lifecycle
    // =========================================================================

    /// Register a freshly connected channel
    ///
    /// Channels from a banned IP are disconnected instead. Returns whether the
    /// channel was registered.
    pub fn new_channel(&mut self, channel: Arc<dyn Channel>) -> bool {
        let now = self.clock.now();
        if self.bans.is_banned(channel.peer_ip(), now) {
            log::info!(
                "Refusing channel {} from banned peer {}",
                channel.id(),
                channel.peer_ip()
            );
            channel.disconnect();
            return false;
        }

        self.registry.new_channel(channel, now);
        true
    }

    /// Forget a disconnected channel; repeat calls are no-ops
    pub fn remove_channel(&mut self, id: ChannelId) {
        self.registry.remove_channel(id);
    }

    // =========================================================================
    // Message handlers
    // =========================================================================

    /// Dispatch an inbound message to its handler
    pub fn handle_message(&mut self, id: ChannelId, msg: Message) {
        let Some(channel) = self.channel(id) else {
            log::debug!("Dropping {} from unknown channel {}", msg.type_name(), id);
            return;
        };

        log::debug!("Received {} from {}", msg.type_name(), id);

        let now = self.clock.now();
        if self.bans.is_banned(channel.peer_ip(), now) {
            // Already told to disconnect; the transport has not caught up
            log::debug!("Dropping {} from banned channel {}", msg.type_name(), id);
            return;
        }

        if !self.registry.record_message(id, now) {
            log::warn!(
                "Channel {} ({}) exceeded its rate limit",
                id,
                channel.peer_ip()
            );
            self.ban_channel(&channel, now);
            return;
        }

        match msg {
            Message::Version(data) => self.handle_version(id, &data),
            Message::PeerList(data) => self.handle_peer_list(id, &data),
            Message::Sync(data) => self.handle_sync(id, &data),
            Message::ChainState(data) => self.handle_chain_state(id, &data),
            Message::Ack(data) => self.handle_p2p_acknowledgement(id, &data),
        }
    }

    /// Version handshake
    pub fn handle_version(&mut self, id: ChannelId, data: &VersionData) {
        let Some(channel) = self.channel(id) else {
            return;
        };

        match self.handshake.check(data) {
            HandshakeOutcome::Incompatible => {
                log::warn!("Channel {} ({}) is on another network", id, channel.peer_ip());
                let now = self.clock.now();
                self.ban_channel(&channel, now);
            }
            HandshakeOutcome::SendVersion(local) => {
                log::debug!("Channel {} sent an empty version, probing again", id);
                channel.send(Message::Version(local));
            }
            HandshakeOutcome::Accepted { rate_limit } => {
                log::info!(
                    "Channel {} ({}) version {}, rate limit {}",
                    id,
                    channel.peer_ip(),
                    data.version,
                    rate_limit
                );
                self.registry.set_rate_limit(id, rate_limit);
            }
        }
    }

    /// Learn endpoints from a peer's gossip
    pub fn handle_peer_list(&mut self, id: ChannelId, data: &PeerListData) {
        let Some(channel) = self.channel(id) else {
            return;
        };

        if let Some(candidates) = self.sync.peer_list_candidates(data, channel.peer_ip()) {
            self.update_peer_addresses(candidates);
        }
    }

    /// Sync status exchange
    pub fn handle_sync(&mut self, id: ChannelId, data: &SyncData) {
        let Some(channel) = self.channel(id) else {
            return;
        };

        match self.sync.on_sync(&data.state, self.factory.is_synced()) {
            SyncAction::MarkSynced => self.factory.set_peer_synced(id, true),
            SyncAction::AnnounceSynced => {
                channel.send(Message::Sync(SyncData::synced()));
                self.factory.set_peer_synced(id, false);
            }
            SyncAction::None => {}
        }
    }

    /// Store a peer's chain summary, stamped with our receive time
    pub fn handle_chain_state(&mut self, id: ChannelId, data: &ChainStateData) {
        let now = self.clock.now();
        if let Err(e) = self.tracker.record(&mut self.registry, id, data, now) {
            log::warn!("Channel {} sent a bad chain state: {}", id, e);
            if let Some(channel) = self.channel(id) {
                channel.disconnect();
            }
        }
    }

    /// Flow-control acknowledgement
    pub fn handle_p2p_acknowledgement(&mut self, id: ChannelId, data: &AckData) {
        let Some(channel) = self.channel(id) else {
            return;
        };

        match check_acknowledgement(data.bytes_processed, channel.bytes_sent()) {
            FlowDecision::Violation { processed, sent } => {
                log::warn!(
                    "Channel {} acknowledged {} bytes but only {} were sent",
                    id,
                    processed,
                    sent
                );
                channel.disconnect();
            }
            FlowDecision::Release { bytes } => {
                channel.acknowledge(bytes);
                channel.send_next();
            }
        }
    }

    // =========================================================================
    // Periodic checks and queries
    // =========================================================================

    /// Disconnect channels whose chain state is missing or stale
    ///
    /// One pass; the caller owns the schedule. Returns how many channels were
    /// told to disconnect.
    pub fn monitor_chain_state(&mut self) -> usize {
        let now = self.clock.now();
        let stale = self.tracker.stale_channels(&self.registry, now);

        for (id, reason) in &stale {
            let Some(channel) = self.channel(*id) else {
                continue;
            };
            match reason {
                Staleness::Missing => {
                    log::info!("Channel {} never reported chain state, disconnecting", id)
                }
                Staleness::Expired { age } => {
                    log::info!("Channel {} chain state is {}s old, disconnecting", id, age)
                }
            }
            channel.disconnect();
        }

        let lifted = self.bans.purge_expired(now);
        if lifted > 0 {
            log::debug!("Lifted {} expired bans", lifted);
        }

        stale.len()
    }

    /// The peer to sync from, if any has a heavier chain than ours
    pub fn get_better_difficulty(&self, local: &CumulativeDifficulty) -> Option<ChannelId> {
        ChainStateTracker::better_difficulty(&self.registry, local)
    }

    /// Peer-list gossip advertising a sample of known IPs
    pub fn peer_list_message(&self) -> Message {
        Message::PeerList(PeerListData {
            peer_ips: self
                .address_book
                .sample_ips(self.config.max_peer_list_size)
                .into_iter()
                .collect(),
            public_port: u32::from(self.config.public_port),
        })
    }

    pub fn is_banned(&self, ip: &str) -> bool {
        self.bans.is_banned(ip, self.clock.now())
    }

    pub fn stats(&self) -> PeerManagerStats {
        PeerManagerStats {
            active_channels: self.registry.channel_count(),
            chain_states: self.registry.chain_state_count(),
            known_peers: self.address_book.len(),
            banned_peers: self.bans.len(),
        }
    }

    // =========================================================================
    // Private helpers
    // =========================================================================

    fn channel(&self, id: ChannelId) -> Option<Arc<dyn Channel>> {
        let channel = self.registry.get(id).cloned();
        if channel.is_none() {
            log::debug!("Unknown channel {}", id);
        }
        channel
    }

    /// Drop a protocol offender and keep it out for the ban duration
    fn ban_channel(&mut self, channel: &Arc<dyn Channel>, now: u64) {
        channel.disconnect();
        self.factory.ban_peer(channel.id());
        self.bans.ban(channel.peer_ip(), now);
    }
}

// =============================================================================
// Tests
// =============================================================================
