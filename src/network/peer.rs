//! Channel registry for P2P networking
//!
//! Tracks the live channels the peer manager knows about together with each
//! one's latest chain-state record. Channels are stored by [`ChannelId`]; the
//! registry holds a shared handle for signalling but never controls the
//! connection's lifetime.

use crate::network::chain_state::NodeChainState;
use crate::network::channel::{Channel, ChannelId};
use crate::network::message::MessageKind;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Length of the message rate-limit window in seconds
pub const RATE_LIMIT_WINDOW: u64 = 60;

/// A registered channel and its per-peer limits
struct ChannelEntry {
    channel: Arc<dyn Channel>,
    /// Max messages accepted per window
    rate_limit: u32,
    window_start: u64,
    window_count: u32,
}

impl ChannelEntry {
    fn new(channel: Arc<dyn Channel>, rate_limit: u32, now: u64) -> Self {
        Self {
            channel,
            rate_limit,
            window_start: now,
            window_count: 0,
        }
    }
}

/// Live channels and their chain-state records
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, ChannelEntry>,
    /// Never holds an id that is missing from `channels`
    chain_states: BTreeMap<ChannelId, NodeChainState>,
    default_rate_limit: u32,
}

impl ChannelRegistry {
    pub fn new(default_rate_limit: u32) -> Self {
        Self {
            channels: BTreeMap::new(),
            chain_states: BTreeMap::new(),
            default_rate_limit,
        }
    }

    /// Register a channel
    ///
    /// Adds it to the active set with a zeroed chain-state record stamped
    /// `now`, and subscribes it to every message kind the peer manager
    /// handles. Registering an id again replaces the previous entry.
    pub fn new_channel(&mut self, channel: Arc<dyn Channel>, now: u64) {
        let id = channel.id();

        for kind in MessageKind::ALL {
            channel.register(kind);
        }

        self.chain_states.insert(id, NodeChainState::initial(now));
        self.channels
            .insert(id, ChannelEntry::new(channel, self.default_rate_limit, now));

        log::info!("Added channel {} ({} active)", id, self.channels.len());
    }

    /// Forget a channel and its record
    ///
    /// Safe to call for unknown or already removed channels. Returns whether
    /// the channel was active.
    pub fn remove_channel(&mut self, id: ChannelId) -> bool {
        let removed = self.channels.remove(&id).is_some();
        self.chain_states.remove(&id);

        if removed {
            log::info!("Removed channel {} ({} active)", id, self.channels.len());
        }
        removed
    }

    pub fn get(&self, id: ChannelId) -> Option<&Arc<dyn Channel>> {
        self.channels.get(&id).map(|entry| &entry.channel)
    }

    /// Snapshot of active ids, in ascending order
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn chain_state(&self, id: ChannelId) -> Option<&NodeChainState> {
        self.chain_states.get(&id)
    }

    /// Records in ascending id order
    pub fn chain_states(&self) -> impl Iterator<Item = (ChannelId, &NodeChainState)> {
        self.chain_states.iter().map(|(id, state)| (*id, state))
    }

    pub fn chain_state_count(&self) -> usize {
        self.chain_states.len()
    }

    /// Replace a channel's record; ignored for inactive channels
    pub fn set_chain_state(&mut self, id: ChannelId, state: NodeChainState) -> bool {
        if !self.channels.contains_key(&id) {
            log::debug!("Ignoring chain state for unknown channel {}", id);
            return false;
        }
        self.chain_states.insert(id, state);
        true
    }

    pub fn rate_limit(&self, id: ChannelId) -> Option<u32> {
        self.channels.get(&id).map(|entry| entry.rate_limit)
    }

    pub fn set_rate_limit(&mut self, id: ChannelId, rate_limit: u32) {
        if let Some(entry) = self.channels.get_mut(&id) {
            entry.rate_limit = rate_limit;
        }
    }

    /// Count one inbound message; returns false once the channel exceeds its
    /// rate limit for the current window
    pub fn record_message(&mut self, id: ChannelId, now: u64) -> bool {
        let Some(entry) = self.channels.get_mut(&id) else {
            return true;
        };

        if now.saturating_sub(entry.window_start) >= RATE_LIMIT_WINDOW {
            entry.window_start = now;
            entry.window_count = 0;
        }

        entry.window_count = entry.window_count.saturating_add(1);
        entry.window_count <= entry.rate_limit
    }

    /// Drop a record without removing its channel
    #[cfg(test)]
    pub(crate) fn clear_chain_state(&mut self, id: ChannelId) {
        self.chain_states.remove(&id);
    }
}
