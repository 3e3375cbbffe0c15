//! Acknowledgement-based send pacing

/// Outcome of a peer acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDecision {
    /// Credit released for `bytes` acknowledged bytes
    Release { bytes: u64 },
    /// Peer claims more than we sent
    Violation { processed: u64, sent: u64 },
}

/// A peer may never acknowledge more bytes than are in flight
pub fn check_acknowledgement(bytes_processed: u64, bytes_sent: u64) -> FlowDecision {
    if bytes_processed > bytes_sent {
        FlowDecision::Violation {
            processed: bytes_processed,
            sent: bytes_sent,
        }
    } else {
        FlowDecision::Release {
            bytes: bytes_processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_acknowledgement() {
        assert_eq!(check_acknowledgement(15, 20), FlowDecision::Release { bytes: 15 });
        assert_eq!(check_acknowledgement(20, 20), FlowDecision::Release { bytes: 20 });
        assert_eq!(check_acknowledgement(0, 0), FlowDecision::Release { bytes: 0 });
        assert_eq!(
            check_acknowledgement(20, 10),
            FlowDecision::Violation {
                processed: 20,
                sent: 10
            }
        );
    }
}
