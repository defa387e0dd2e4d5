use thiserror::Error;

/// Why a node cannot compute a positive consensus weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("address is not an eligible validator")]
    NotEligible,

    #[error("eligible validator has zero weight")]
    ZeroWeight,
}

/// Errors specific to the chain state machine.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("invalid bid: {reason}")]
    InvalidBid { reason: String },

    #[error("invalid vote: {reason}")]
    InvalidVote { reason: String },

    #[error("parent mismatch: tip is {expected}, block builds on {actual}")]
    ParentMismatch { expected: String, actual: String },

    #[error("duplicate {kind}: {hash}")]
    Duplicate { kind: &'static str, hash: String },

    #[error("stale {kind}: built on {last_hash}")]
    Stale { kind: &'static str, last_hash: String },

    #[error("address already voted in this round")]
    AlreadyVoted,

    #[error("block height {height} is behind the chain")]
    HeightBehind { height: u64 },

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("nonce out of sequence: expected {expected}, got {actual}")]
    NonceMismatch { expected: u32, actual: u32 },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("crypto error: {0}")]
    Crypto(#[from] tessera_types::error::TesseraError),

    #[error("storage error: {0}")]
    StorageError(#[from] tessera_storage::error::StorageError),
}

impl ChainError {
    /// Whether the peer that sent the rejected item should be dropped.
    /// Gossip races (duplicates, stale rounds, repeated votes, replayed
    /// nonces) are not held against the sender.
    pub fn is_misbehavior(&self) -> bool {
        !matches!(
            self,
            ChainError::Duplicate { .. }
                | ChainError::Stale { .. }
                | ChainError::AlreadyVoted
                | ChainError::HeightBehind { .. }
                | ChainError::NonceMismatch { .. }
                | ChainError::StorageError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::InsufficientBalance {
            available: 10,
            required: 600,
        };
        assert_eq!(err.to_string(), "insufficient balance: have 10, need 600");

        let err: ChainError = ConsensusError::ZeroWeight.into();
        assert_eq!(
            err.to_string(),
            "consensus error: eligible validator has zero weight"
        );
    }

    #[test]
    fn test_misbehavior_classification() {
        assert!(!ChainError::AlreadyVoted.is_misbehavior());
        assert!(!ChainError::Duplicate {
            kind: "bid",
            hash: String::new()
        }
        .is_misbehavior());
        assert!(ChainError::InvalidBid {
            reason: "bad signature".to_string()
        }
        .is_misbehavior());
        assert!(ChainError::Overflow.is_misbehavior());
    }
}
