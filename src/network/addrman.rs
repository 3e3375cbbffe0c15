//! Address book for peer discovery
//!
//! Keeps the set of syntactically valid `ip:port` endpoints we know about:
//! - Seeded from the static configuration list on every load
//! - Grown from peer-list gossip
//! - Persisted to a line-oriented file, rewritten off the caller's thread on
//!   every change
//!
//! Validation is purely syntactic. Private and reserved ranges are accepted.

use crate::network::ban::BanList;
use crate::network::channel::ConnectionFactory;
use crate::storage::PeerStore;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Endpoint validation
// =============================================================================

/// Why an endpoint string was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Malformed endpoint: {0}")]
    Malformed(String),
    #[error("Invalid IPv4 address: {0}")]
    InvalidIp(String),
    #[error("Port out of range: {0}")]
    InvalidPort(String),
}

/// A validated `ip:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerEndpoint {
    ip: String,
    port: u16,
}

impl PeerEndpoint {
    pub fn new(ip: &str, port: u32) -> Result<Self, EndpointError> {
        if !is_valid_ip(ip) {
            return Err(EndpointError::InvalidIp(ip.to_string()));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| EndpointError::InvalidPort(port.to_string()))?;
        Ok(Self {
            ip: ip.to_string(),
            port,
        })
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for PeerEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        // Canonical decimal only, so each peer has exactly one spelling
        if port.is_empty()
            || !port.bytes().all(|b| b.is_ascii_digit())
            || (port.len() > 1 && port.starts_with('0'))
        {
            return Err(EndpointError::InvalidPort(port.to_string()));
        }
        let port: u32 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
        Self::new(ip, port)
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Dotted-quad IPv4 in canonical form: four octets in [0, 255], no leading
/// zeros, no signs or whitespace
fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// The canonical spelling of `endpoint`, if it is valid
fn canonical(endpoint: &str) -> Option<String> {
    endpoint
        .parse::<PeerEndpoint>()
        .ok()
        .map(|parsed| parsed.to_string())
}

// =============================================================================
// Address Book
// =============================================================================

/// Persisted set of reachable peer endpoints
#[derive(Debug)]
pub struct AddressBook {
    /// Known endpoints, always valid
    peers: BTreeSet<String>,
    /// Static seed list
    seeds: Vec<String>,
    store: PeerStore,
}

impl AddressBook {
    /// Create an empty book; call [`AddressBook::load`] to populate it
    pub fn new(store: PeerStore, seeds: Vec<String>) -> Self {
        Self {
            peers: BTreeSet::new(),
            seeds,
            store,
        }
    }

    /// True iff `ip` is four decimal octets in [0,255] and `port` is in [1,65535]
    pub fn validate(ip: &str, port: u32) -> bool {
        PeerEndpoint::new(ip, port).is_ok()
    }

    /// Revalidate `existing` and add `new_ip:new_port` if it is valid
    ///
    /// Members of `existing` are checked as whole `ip:port` strings, the new
    /// pair as separate fields. `existing` itself is left untouched.
    pub fn get_valid_peers(
        existing: &HashSet<String>,
        new_ip: &str,
        new_port: u32,
    ) -> HashSet<String> {
        let mut valid: HashSet<String> = existing
            .iter()
            .filter_map(|peer| {
                let endpoint = canonical(peer);
                if endpoint.is_none() {
                    log::debug!("Dropping invalid peer address {}", peer);
                }
                endpoint
            })
            .collect();

        if let Ok(endpoint) = PeerEndpoint::new(new_ip, new_port) {
            valid.insert(endpoint.to_string());
        } else {
            log::debug!("Dropping invalid peer address {}:{}", new_ip, new_port);
        }

        valid
    }

    /// Load the persisted book, merge the seeds and write the result back
    ///
    /// A missing, unreadable or corrupt file counts as empty; rewriting it
    /// repairs it. Never fails.
    pub fn load(&mut self) {
        let stored = match self.store.load() {
            Ok(lines) => lines,
            Err(e) => {
                if self.store.exists() {
                    log::warn!(
                        "Unreadable peers file {}: {}",
                        self.store.path().display(),
                        e
                    );
                } else {
                    log::debug!("No peers file at {}", self.store.path().display());
                }
                Vec::new()
            }
        };

        let mut peers: BTreeSet<String> = stored.iter().filter_map(|p| canonical(p)).collect();

        if peers.is_empty() && !stored.is_empty() {
            log::warn!(
                "Peers file {} has no valid entries, rebuilding from seeds",
                self.store.path().display()
            );
        }

        for seed in &self.seeds {
            if let Some(seed) = canonical(seed) {
                peers.insert(seed);
            } else {
                log::warn!("Ignoring invalid seed peer {}", seed);
            }
        }

        self.peers = peers;
        // Startup only, so a blocking write is fine here
        if let Err(e) = self.store.save(&self.peers) {
            log::warn!("Failed to write peers file: {}", e);
        }

        log::info!("Loaded {} peer addresses", self.peers.len());
    }

    /// Merge `new_endpoints` into the book and dial the ones we did not know
    ///
    /// Invalid endpoints are dropped. Endpoints on a banned IP are recorded
    /// but not dialled. Returns the newly added endpoints in sorted order.
    pub fn update<I>(
        &mut self,
        new_endpoints: I,
        factory: &dyn ConnectionFactory,
        bans: &BanList,
        now: u64,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = Vec::new();
        for endpoint in new_endpoints {
            let parsed = match endpoint.parse::<PeerEndpoint>() {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::debug!("Dropping peer address {}: {}", endpoint, e);
                    continue;
                }
            };
            if self.peers.insert(parsed.to_string()) {
                added.push(parsed);
            }
        }

        if added.is_empty() {
            return Vec::new();
        }

        self.persist();

        added.sort();
        let mut added_strings = Vec::with_capacity(added.len());
        for endpoint in added {
            let endpoint_str = endpoint.to_string();
            if bans.is_banned(endpoint.ip(), now) {
                log::debug!("Not dialling banned peer {}", endpoint_str);
            } else {
                factory.connect_peer(&endpoint_str);
            }
            added_strings.push(endpoint_str);
        }

        log::info!("Learned {} new peer addresses", added_strings.len());
        added_strings
    }

    /// Up to `count` distinct known IPs, in random order
    pub fn sample_ips(&self, count: usize) -> Vec<String> {
        let mut ips: Vec<String> = self
            .peers
            .iter()
            .filter_map(|p| p.rsplit_once(':').map(|(ip, _)| ip.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        ips.shuffle(&mut rand::thread_rng());
        ips.truncate(count);
        ips
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.peers.contains(endpoint)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &String> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Wait for pending writes of the peers file
    pub async fn flush(&self) {
        self.store.flush().await;
    }

    fn persist(&self) {
        self.store
            .save_in_background(self.peers.iter().cloned().collect());
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::channel::{FactoryCommand, FactoryHandle};
    use std::fs;
    use std::time::Duration;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn seeds() -> Vec<String> {
        vec!["104.251.219.215:9000".to_string(), "35.177.60.137:9000".to_string()]
    }

    #[test]
    fn test_validate() {
        assert!(AddressBook::validate("127.0.0.1", 9000));
        assert!(AddressBook::validate("0.0.0.0", 1));
        assert!(AddressBook::validate("255.255.255.255", 65535));

        assert!(!AddressBook::validate("127.0.0.1", 0));
        assert!(!AddressBook::validate("127.0.0.1", 65536));
        assert!(!AddressBook::validate("127.0.0.1", 70000));
        assert!(!AddressBook::validate("256.256.256.256", 10000));
        assert!(!AddressBook::validate("127.0.0", 9000));
        assert!(!AddressBook::validate("127.0.0.1.5", 9000));
        assert!(!AddressBook::validate("127..0.1", 9000));
        assert!(!AddressBook::validate("127.0.0.-1", 9000));
        assert!(!AddressBook::validate("127.0.0.+1", 9000));
        assert!(!AddressBook::validate("a.b.c.d", 9000));
        assert!(!AddressBook::validate("", 9000));
        assert!(!AddressBook::validate(" 1.2.3.4", 9000));
        assert!(!AddressBook::validate("1.2.3.1000", 9000));
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint: PeerEndpoint = "187.0.0.1:1000".parse().unwrap();
        assert_eq!(endpoint.ip(), "187.0.0.1");
        assert_eq!(endpoint.port(), 1000);
        assert_eq!(endpoint.to_string(), "187.0.0.1:1000");

        assert!(matches!(
            "187.0.0.1".parse::<PeerEndpoint>(),
            Err(EndpointError::Malformed(_))
        ));
        assert!(matches!(
            "187.0.0.1:".parse::<PeerEndpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.3:90000".parse::<PeerEndpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.3:99999999999999999999".parse::<PeerEndpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.3:5000:9000".parse::<PeerEndpoint>(),
            Err(EndpointError::InvalidIp(_))
        ));
    }

    #[test]
    fn test_get_valid_peers_works() {
        let result = AddressBook::get_valid_peers(&HashSet::new(), "187.0.0.1", 1000);
        assert_eq!(result, set(&["187.0.0.1:1000"]));

        let result_2 = AddressBook::get_valid_peers(&result, "187.0.0.1", 2000);
        assert_eq!(result_2, set(&["187.0.0.1:1000", "187.0.0.1:2000"]));
        // Input is not mutated
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_get_valid_peers_bad_ip_port() {
        let bad_port = AddressBook::get_valid_peers(&HashSet::new(), "127.0.0.1", 70000);
        assert!(bad_port.is_empty());

        let bad_ip = AddressBook::get_valid_peers(&HashSet::new(), "256.256.256.256", 10000);
        assert!(bad_ip.is_empty());
    }

    #[test]
    fn test_get_valid_peers_revalidates_existing() {
        let existing = set(&["256.256.256.256:9000", "127.0.0.3:90000"]);
        let result = AddressBook::get_valid_peers(&existing, "187.0.0.1", 9000);
        assert_eq!(result, set(&["187.0.0.1:9000"]));
    }

    #[test]
    fn test_load_no_file_uses_seeds() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers.txt");
        let mut book = AddressBook::new(PeerStore::new(&path), seeds());

        book.load();

        assert_eq!(book.len(), 2);
        for seed in seeds() {
            assert!(book.contains(&seed));
        }
        // The merged set is written back
        assert!(path.exists());
    }

    #[test]
    fn test_load_merges_file_and_seeds() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers.txt");
        fs::write(&path, "34.208.138.15:9000\n300.1.1.1:9000\n104.251.219.215:9000\n").unwrap();

        let mut book = AddressBook::new(PeerStore::new(&path), seeds());
        book.load();

        assert!(book.contains("34.208.138.15:9000"));
        assert!(!book.contains("300.1.1.1:9000"));
        assert_eq!(book.len(), 3);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("300.1.1.1"));
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers_corrupt.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x7b, 0x0a, 0x22]).unwrap();

        let mut book = AddressBook::new(PeerStore::new(&path), seeds());
        book.load();

        let contents = fs::read_to_string(&path).unwrap();
        for seed in seeds() {
            assert!(book.contains(&seed));
            assert!(contents.contains(&seed));
        }
    }

    #[test]
    fn test_load_drops_invalid_seed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut book = AddressBook::new(
            PeerStore::new(temp_dir.path().join("peers.txt")),
            vec!["1.2.3.4:9000".to_string(), "1.2.3.4".to_string()],
        );
        book.load();
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_update_connects_to_new_peers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers.txt");
        let mut book = AddressBook::new(PeerStore::new(&path), vec!["127.0.0.1:9000".to_string()]);
        book.load();

        let (factory, mut rx) = FactoryHandle::new();
        let bans = BanList::new(Duration::from_secs(60));

        let added = book.update(
            vec![
                "127.0.0.1:9000".to_string(),
                "127.0.0.2:9000".to_string(),
                "999.0.0.1:9000".to_string(),
            ],
            &factory,
            &bans,
            0,
        );

        assert_eq!(added, vec!["127.0.0.2:9000".to_string()]);
        assert_eq!(
            rx.try_recv().unwrap(),
            FactoryCommand::ConnectPeer("127.0.0.2:9000".to_string())
        );
        assert!(rx.try_recv().is_err());
        assert!(fs::read_to_string(&path).unwrap().contains("127.0.0.2:9000"));
    }

    #[test]
    fn test_update_skips_banned_ip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut book = AddressBook::new(PeerStore::new(temp_dir.path().join("peers.txt")), vec![]);

        let (factory, mut rx) = FactoryHandle::new();
        let mut bans = BanList::new(Duration::from_secs(60));
        bans.ban("10.0.0.9", 100);

        let added = book.update(vec!["10.0.0.9:9000".to_string()], &factory, &bans, 110);

        assert_eq!(added, vec!["10.0.0.9:9000".to_string()]);
        assert!(book.contains("10.0.0.9:9000"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sample_ips() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut book = AddressBook::new(
            PeerStore::new(temp_dir.path().join("peers.txt")),
            vec![
                "1.1.1.1:9000".to_string(),
                "1.1.1.1:9001".to_string(),
                "2.2.2.2:9000".to_string(),
                "3.3.3.3:9000".to_string(),
            ],
        );
        book.load();

        let all = book.sample_ips(10);
        assert_eq!(all.len(), 3);

        let some = book.sample_ips(2);
        assert_eq!(some.len(), 2);
    }

    #[test]
    fn test_load_keeps_valid_entries_around_bad_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers.txt");
        fs::write(&path, b"34.208.138.15:9000\n\xff\xfe\n10.9.9.9:9000\n").unwrap();

        let mut book = AddressBook::new(PeerStore::new(&path), vec!["1.2.3.4:9000".to_string()]);
        book.load();

        assert!(book.contains("34.208.138.15:9000"));
        assert!(book.contains("10.9.9.9:9000"));
        assert!(book.contains("1.2.3.4:9000"));
        assert_eq!(book.len(), 3);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("34.208.138.15:9000"));
    }

    #[test]
    fn test_non_canonical_endpoints_rejected() {
        assert!(!AddressBook::validate("01.2.3.4", 9000));
        assert!(!AddressBook::validate("1.2.3.004", 9000));
        assert!("1.2.3.4:09000".parse::<PeerEndpoint>().is_err());
        assert!("1.2.3.4:+9000".parse::<PeerEndpoint>().is_err());
        assert!("0.0.0.0:1".parse::<PeerEndpoint>().is_ok());

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers.txt");
        fs::write(&path, "001.002.003.004:09000\n1.2.3.4:9000\n").unwrap();

        let mut book = AddressBook::new(PeerStore::new(&path), vec!["1.2.3.4:9000".to_string()]);
        book.load();
        assert_eq!(book.endpoints().collect::<Vec<_>>(), vec!["1.2.3.4:9000"]);

        let (factory, mut rx) = FactoryHandle::new();
        let bans = BanList::new(Duration::from_secs(60));
        let added = book.update(vec!["05.6.7.8:080".to_string()], &factory, &bans, 0);

        assert!(added.is_empty());
        assert_eq!(book.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_update_stores_what_it_dials() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut book = AddressBook::new(PeerStore::new(temp_dir.path().join("peers.txt")), vec![]);

        let (factory, mut rx) = FactoryHandle::new();
        let bans = BanList::new(Duration::from_secs(60));
        let added = book.update(vec!["5.6.7.8:80".to_string()], &factory, &bans, 0);

        assert_eq!(added, vec!["5.6.7.8:80".to_string()]);
        assert!(book.contains("5.6.7.8:80"));
        assert_eq!(
            rx.try_recv().unwrap(),
            FactoryCommand::ConnectPeer("5.6.7.8:80".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_writes_off_the_caller() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("peers.txt");
        let mut book = AddressBook::new(PeerStore::new(&path), vec!["1.2.3.4:9000".to_string()]);
        book.load();

        let (factory, _rx) = FactoryHandle::new();
        let bans = BanList::new(Duration::from_secs(60));
        book.update(vec!["10.0.0.2:9000".to_string()], &factory, &bans, 0);
        book.update(vec!["10.0.0.3:9000".to_string()], &factory, &bans, 0);
        book.flush().await;

        let stored = PeerStore::new(&path).load().unwrap();
        assert_eq!(stored, vec!["1.2.3.4:9000", "10.0.0.2:9000", "10.0.0.3:9000"]);
    }
}
