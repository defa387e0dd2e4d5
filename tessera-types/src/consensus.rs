use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Hash, Signature};

/// A validator's offer to mint the block following `last_block_hash`.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NodeBid {
    pub last_block_hash: Hash,
    pub address: Address,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

impl NodeBid {
    /// `last_block_hash ‖ address`. Its Keccak-256 is both the signed digest
    /// and the bid pool key.
    pub fn signing_bytes(&self) -> Vec<u8> {
        bid_key_preimage(&self.last_block_hash, &self.address)
    }
}

/// A validator's endorsement of another validator's bid.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NodeVote {
    pub last_block_hash: Hash,
    /// The voter.
    pub address: Address,
    /// The endorsed bidder.
    pub voted_for: Address,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

impl NodeVote {
    /// `last_block_hash ‖ address ‖ voted_for`. Its Keccak-256 is both the
    /// signed digest and the vote key.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 20 + 20);
        buf.extend_from_slice(&self.last_block_hash);
        buf.extend_from_slice(&self.address);
        buf.extend_from_slice(&self.voted_for);
        buf
    }

    /// Preimage of the key of the bid this vote endorses.
    pub fn bid_key_preimage(&self) -> Vec<u8> {
        bid_key_preimage(&self.last_block_hash, &self.voted_for)
    }
}

/// What a node already holds of the voting pools, sent to ask a peer for the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingPoolDigest {
    pub bid_hashes: Vec<Hash>,
    /// Bid hash and the vote hashes held in its bucket.
    pub buckets: Vec<(Hash, Vec<Hash>)>,
}

/// Bids and vote buckets a peer did not mention in its digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingPoolDelta {
    pub bids: Vec<NodeBid>,
    pub buckets: Vec<Vec<NodeVote>>,
}

impl VotingPoolDelta {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.buckets.iter().all(Vec::is_empty)
    }
}

fn bid_key_preimage(last_block_hash: &Hash, bidder: &Address) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 20);
    buf.extend_from_slice(last_block_hash);
    buf.extend_from_slice(bidder);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::EMPTY_SIGNATURE;

    #[test]
    fn test_vote_references_bid_preimage() {
        let bid = NodeBid {
            last_block_hash: [1u8; 32],
            address: [2u8; 20],
            signature: EMPTY_SIGNATURE,
        };
        let vote = NodeVote {
            last_block_hash: [1u8; 32],
            address: [3u8; 20],
            voted_for: [2u8; 20],
            signature: EMPTY_SIGNATURE,
        };
        assert_eq!(vote.bid_key_preimage(), bid.signing_bytes());
        assert_ne!(vote.signing_bytes(), bid.signing_bytes());
        assert_eq!(vote.signing_bytes().len(), 72);
    }
}
