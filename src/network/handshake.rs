//! Version handshake checks

use crate::network::message::VersionData;

/// What to do with a peer's version message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Peer is on another network; drop it
    Incompatible,
    /// Peer sent an empty version; answer with ours
    SendVersion(VersionData),
    /// Compatible peer; apply the negotiated message rate limit
    Accepted { rate_limit: u32 },
}

/// Checks peers against our version and genesis
#[derive(Debug, Clone)]
pub struct HandshakeValidator {
    version: String,
    genesis_prev_hash: Vec<u8>,
    rate_limit: u32,
}

impl HandshakeValidator {
    pub fn new(version: String, genesis_prev_hash: Vec<u8>, rate_limit: u32) -> Self {
        Self {
            version,
            genesis_prev_hash,
            rate_limit,
        }
    }

    /// Our own version message
    pub fn local_version(&self) -> VersionData {
        VersionData {
            version: self.version.clone(),
            genesis_prev_hash: self.genesis_prev_hash.clone(),
            rate_limit: self.rate_limit,
        }
    }

    /// Genesis is checked before the version string, so an uninitialised
    /// peer on another network is still dropped.
    pub fn check(&self, peer: &VersionData) -> HandshakeOutcome {
        if peer.genesis_prev_hash != self.genesis_prev_hash {
            log::warn!(
                "Genesis mismatch: expected {} found {}",
                hex::encode(&self.genesis_prev_hash),
                hex::encode(&peer.genesis_prev_hash)
            );
            return HandshakeOutcome::Incompatible;
        }

        if peer.version.is_empty() {
            return HandshakeOutcome::SendVersion(self.local_version());
        }

        // A peer advertising no limit gets ours
        let rate_limit = match peer.rate_limit {
            0 => self.rate_limit,
            limit => limit.min(self.rate_limit),
        };
        HandshakeOutcome::Accepted { rate_limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> HandshakeValidator {
        HandshakeValidator::new("1.2.3".to_string(), b"genesis".to_vec(), 500)
    }

    fn version(version: &str, genesis: &[u8], rate_limit: u32) -> VersionData {
        VersionData {
            version: version.to_string(),
            genesis_prev_hash: genesis.to_vec(),
            rate_limit,
        }
    }

    #[test]
    fn test_accepts_matching_peer() {
        assert_eq!(
            validator().check(&version("1.2.3", b"genesis", 500)),
            HandshakeOutcome::Accepted { rate_limit: 500 }
        );
    }

    #[test]
    fn test_negotiates_lower_rate_limit() {
        let v = validator();
        assert_eq!(
            v.check(&version("1.2.4", b"genesis", 100)),
            HandshakeOutcome::Accepted { rate_limit: 100 }
        );
        assert_eq!(
            v.check(&version("1.2.4", b"genesis", 9000)),
            HandshakeOutcome::Accepted { rate_limit: 500 }
        );
        assert_eq!(
            v.check(&version("1.2.4", b"genesis", 0)),
            HandshakeOutcome::Accepted { rate_limit: 500 }
        );
    }

    #[test]
    fn test_empty_version_gets_ours() {
        match validator().check(&version("", b"genesis", 500)) {
            HandshakeOutcome::SendVersion(reply) => {
                assert_eq!(reply.version, "1.2.3");
                assert_eq!(reply.genesis_prev_hash, b"genesis".to_vec());
                assert_eq!(reply.rate_limit, 500);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_genesis_mismatch() {
        let v = validator();
        assert_eq!(
            v.check(&version("1.2.3", b"TEST123", 500)),
            HandshakeOutcome::Incompatible
        );
        // Checked before the version string
        assert_eq!(
            v.check(&version("", b"TEST123", 500)),
            HandshakeOutcome::Incompatible
        );
    }
}
