//! Temporary bans for peers that broke protocol
//!
//! Bans survive restarts when the list has a store: one `ip expiry` pair
//! per line, expiry in unix seconds.

use crate::storage::PeerStore;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Ban list keyed by peer IP
#[derive(Debug, Clone)]
pub struct BanList {
    /// IP -> unix time the ban lifts
    banned: BTreeMap<String, u64>,
    duration: Duration,
    store: Option<PeerStore>,
}

impl BanList {
    /// In-memory only
    pub fn new(duration: Duration) -> Self {
        Self {
            banned: BTreeMap::new(),
            duration,
            store: None,
        }
    }

    /// Persisted to `store` on every change
    pub fn with_store(duration: Duration, store: PeerStore) -> Self {
        Self {
            store: Some(store),
            ..Self::new(duration)
        }
    }

    /// Restore unexpired bans from the store
    ///
    /// Malformed lines are skipped. A missing file is an empty list.
    pub fn load(&mut self, now: u64) {
        let Some(store) = &self.store else {
            return;
        };

        let lines = match store.load() {
            Ok(lines) => lines,
            Err(e) => {
                if store.exists() {
                    log::warn!("Unreadable ban file {}: {}", store.path().display(), e);
                }
                return;
            }
        };

        for line in lines {
            match parse_entry(&line) {
                Some((ip, until)) if now < until => {
                    let entry = self.banned.entry(ip).or_insert(until);
                    *entry = (*entry).max(until);
                }
                Some(_) => {}
                None => log::debug!("Skipping malformed ban entry {}", line),
            }
        }

        log::info!("Loaded {} active bans", self.banned.len());
    }

    /// Ban `ip` until `now + duration`, extending any existing ban
    pub fn ban(&mut self, ip: &str, now: u64) {
        let until = now.saturating_add(self.duration.as_secs());
        let entry = self.banned.entry(ip.to_string()).or_insert(until);
        *entry = (*entry).max(until);
        log::info!("Banned {} for {}s", ip, self.duration.as_secs());
        self.persist();
    }

    pub fn is_banned(&self, ip: &str, now: u64) -> bool {
        self.banned.get(ip).map(|&until| now < until).unwrap_or(false)
    }

    /// Drop expired bans, returning how many were lifted
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.banned.len();
        self.banned.retain(|_, until| now < *until);
        let lifted = before - self.banned.len();
        if lifted > 0 {
            self.persist();
        }
        lifted
    }

    pub fn len(&self) -> usize {
        self.banned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banned.is_empty()
    }

    /// Wait for pending writes of the ban file
    pub async fn flush(&self) {
        if let Some(store) = &self.store {
            store.flush().await;
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            store.save_in_background(
                self.banned
                    .iter()
                    .map(|(ip, until)| format!("{} {}", ip, until))
                    .collect(),
            );
        }
    }
}

fn parse_entry(line: &str) -> Option<(String, u64)> {
    let (ip, until) = line.split_once(' ')?;
    ip.parse::<Ipv4Addr>().ok()?;
    let until = until.trim().parse().ok()?;
    Some((ip.to_string(), until))
}
