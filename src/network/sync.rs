//! Sync status negotiation and peer-list gossip

use crate::network::addrman::AddressBook;
use crate::network::message::{PeerListData, SyncState};
use std::collections::HashSet;

/// Response to a peer's sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Record the peer as synced
    MarkSynced,
    /// Tell the peer we are synced and mark it not yet synced
    AnnounceSynced,
    None,
}

/// Sync handshake and discovery rules
#[derive(Debug, Clone)]
pub struct SyncNegotiator {
    discovery_enabled: bool,
}

impl SyncNegotiator {
    pub fn new(discovery_enabled: bool) -> Self {
        Self { discovery_enabled }
    }

    /// Decide how to answer a peer's sync status
    ///
    /// We only vouch for our own status when we are synced.
    pub fn on_sync(&self, state: &str, locally_synced: bool) -> SyncAction {
        match SyncState::parse(state) {
            SyncState::Synced => SyncAction::MarkSynced,
            SyncState::Unsynced => SyncAction::None,
            SyncState::Unknown if locally_synced => SyncAction::AnnounceSynced,
            SyncState::Unknown => SyncAction::None,
        }
    }

    /// Endpoints to learn from a peer list, or `None` if there is nothing to do
    ///
    /// Every advertised IP and the sender's own address are combined with the
    /// advertised public port, then validated.
    pub fn peer_list_candidates(
        &self,
        data: &PeerListData,
        sender_ip: &str,
    ) -> Option<HashSet<String>> {
        if !self.discovery_enabled {
            log::debug!("Peer discovery disabled, ignoring peer list");
            return None;
        }
        if data.peer_ips.is_empty() {
            return None;
        }

        let advertised: HashSet<String> = data
            .peer_ips
            .iter()
            .map(|ip| format!("{}:{}", ip, data.public_port))
            .collect();

        Some(AddressBook::get_valid_peers(
            &advertised,
            sender_ip,
            data.public_port,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_list(ips: &[&str], public_port: u32) -> PeerListData {
        PeerListData {
            peer_ips: ips.iter().map(|s| s.to_string()).collect(),
            public_port,
        }
    }

    #[test]
    fn test_on_sync() {
        let negotiator = SyncNegotiator::new(true);

        assert_eq!(negotiator.on_sync("Synced", false), SyncAction::MarkSynced);
        assert_eq!(negotiator.on_sync("Unsynced", true), SyncAction::None);
        assert_eq!(negotiator.on_sync("whatever", true), SyncAction::None);
        assert_eq!(negotiator.on_sync("", false), SyncAction::None);
        assert_eq!(negotiator.on_sync("", true), SyncAction::AnnounceSynced);
    }

    #[test]
    fn test_peer_list_candidates() {
        let negotiator = SyncNegotiator::new(true);

        let candidates = negotiator
            .peer_list_candidates(&peer_list(&["127.0.0.3", "127.0.0.4", "999.1.1.1"], 9000), "187.0.0.2")
            .unwrap();

        let expected: HashSet<String> = ["127.0.0.3:9000", "127.0.0.4:9000", "187.0.0.2:9000"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(candidates, expected);
    }

    #[test]
    fn test_peer_list_ips_with_ports_are_dropped() {
        let negotiator = SyncNegotiator::new(true);

        let candidates = negotiator
            .peer_list_candidates(&peer_list(&["127.0.0.3:5000", "127.0.0.4:5001"], 9000), "187.0.0.2")
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(candidates.contains("187.0.0.2:9000"));
    }

    #[test]
    fn test_peer_list_ignored() {
        assert!(SyncNegotiator::new(false)
            .peer_list_candidates(&peer_list(&["127.0.0.3"], 9000), "187.0.0.2")
            .is_none());
        assert!(SyncNegotiator::new(true)
            .peer_list_candidates(&peer_list(&[], 9000), "187.0.0.2")
            .is_none());
    }
}
