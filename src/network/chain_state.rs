//! Peer chain-state tracking
//!
//! Peers periodically report a summary of their chain. The tracker keeps the
//! latest report per channel, flags channels whose report is missing or too
//! old, and picks the heaviest chain to sync from.

use crate::network::channel::ChannelId;
use crate::network::message::ChainStateData;
use crate::network::peer::ChannelRegistry;
use num_bigint::BigUint;
use num_traits::Zero;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Rejected chain-state report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainStateError {
    #[error("Cumulative difficulty is {width} bytes, at most {max} allowed")]
    OversizedDifficulty { width: usize, max: usize },
}

/// Accumulated chain weight, an unsigned big integer
///
/// Always compared numerically. The wire encoding is big-endian, padded to
/// [`CumulativeDifficulty::WIDTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CumulativeDifficulty(BigUint);

impl CumulativeDifficulty {
    /// Encoded width in bytes
    pub const WIDTH: usize = 32;

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Decode big-endian bytes of any width
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Big-endian, left-padded to `WIDTH` bytes (longer if the value needs it)
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let raw = if self.0.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        };
        let mut out = vec![0u8; Self::WIDTH.saturating_sub(raw.len())];
        out.extend_from_slice(&raw);
        out
    }

}

impl From<u64> for CumulativeDifficulty {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for CumulativeDifficulty {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl FromStr for CumulativeDifficulty {
    type Err = num_bigint::ParseBigIntError;

    /// Parse a decimal string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(BigUint::from_str(s)?))
    }
}

impl fmt::Display for CumulativeDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Latest chain summary reported by a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChainState {
    pub block_number: u64,
    pub header_hash: Vec<u8>,
    pub cumulative_difficulty: CumulativeDifficulty,
    /// Local time the report was received
    pub timestamp: u64,
}

impl NodeChainState {
    /// Placeholder inserted when a channel registers
    pub fn initial(now: u64) -> Self {
        Self {
            block_number: 0,
            header_hash: Vec::new(),
            cumulative_difficulty: CumulativeDifficulty::zero(),
            timestamp: now,
        }
    }

    /// Build from a peer report, stamped with our receive time
    ///
    /// Difficulties wider than [`CumulativeDifficulty::WIDTH`] are rejected so
    /// every stored value compares at the same width.
    pub fn from_report(data: &ChainStateData, received_at: u64) -> Result<Self, ChainStateError> {
        let width = data.cumulative_difficulty.len();
        if width > CumulativeDifficulty::WIDTH {
            return Err(ChainStateError::OversizedDifficulty {
                width,
                max: CumulativeDifficulty::WIDTH,
            });
        }

        Ok(Self {
            block_number: data.block_number,
            header_hash: data.header_hash.clone(),
            cumulative_difficulty: CumulativeDifficulty::from_be_bytes(&data.cumulative_difficulty),
            timestamp: received_at,
        })
    }

    /// Seconds since the report, zero if the clock went backwards
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Why a channel failed the staleness scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Never completed the chain-state exchange
    Missing,
    /// Last report is older than the timeout
    Expired { age: u64 },
}

/// Chain-state bookkeeping over the channel registry
#[derive(Debug, Clone)]
pub struct ChainStateTracker {
    timeout: Duration,
}

impl ChainStateTracker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Overwrite the channel's record with `data`, stamped `now`
    ///
    /// The timestamp carried by the peer is ignored. Returns false if the
    /// channel is not registered. A malformed report leaves the previous
    /// record in place.
    pub fn record(
        &self,
        registry: &mut ChannelRegistry,
        channel: ChannelId,
        data: &ChainStateData,
        now: u64,
    ) -> Result<bool, ChainStateError> {
        let state = NodeChainState::from_report(data, now)?;
        log::debug!(
            "Chain state from {}: height={} hash={} difficulty={}",
            channel,
            state.block_number,
            hex::encode(&state.header_hash),
            state.cumulative_difficulty
        );
        Ok(registry.set_chain_state(channel, state))
    }

    /// Active channels with a missing or expired record
    ///
    /// Works on a snapshot of the active set.
    pub fn stale_channels(
        &self,
        registry: &ChannelRegistry,
        now: u64,
    ) -> Vec<(ChannelId, Staleness)> {
        let timeout = self.timeout.as_secs();
        registry
            .channel_ids()
            .into_iter()
            .filter_map(|id| match registry.chain_state(id) {
                None => Some((id, Staleness::Missing)),
                Some(state) if state.age(now) > timeout => {
                    Some((id, Staleness::Expired { age: state.age(now) }))
                }
                Some(_) => None,
            })
            .collect()
    }

    /// The channel with the heaviest chain strictly above `local`
    ///
    /// Only cumulative difficulty counts. Ties go to the first channel in
    /// registry order, i.e. the lowest id.
    pub fn better_difficulty(
        registry: &ChannelRegistry,
        local: &CumulativeDifficulty,
    ) -> Option<ChannelId> {
        let mut best: Option<(ChannelId, &CumulativeDifficulty)> = None;
        for (id, state) in registry.chain_states() {
            let difficulty = &state.cumulative_difficulty;
            if difficulty <= local {
                continue;
            }
            match best {
                Some((_, best_difficulty)) if difficulty <= best_difficulty => {}
                _ => best = Some((id, difficulty)),
            }
        }
        best.map(|(id, _)| id)
    }
}
