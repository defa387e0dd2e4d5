use std::cmp::Ordering;

use tessera_crypto::hash::keccak256;
use tessera_crypto::signer::Signer;
use tessera_types::consensus::{NodeBid, NodeVote};
use tessera_types::primitives::{Address, Hash};

use crate::error::{ChainError, ConsensusError};
use crate::ledger::LedgerState;
use crate::mempool::MemPools;

/// Pool key of a bid: `keccak(last_block_hash ‖ address)`.
pub fn bid_hash(bid: &NodeBid) -> Hash {
    keccak256(&bid.signing_bytes())
}

/// Pool key of a vote, also its signed digest.
pub fn vote_hash(vote: &NodeVote) -> Hash {
    keccak256(&vote.signing_bytes())
}

/// Key of the bid a vote endorses.
pub fn vote_bid_hash(vote: &NodeVote) -> Hash {
    keccak256(&vote.bid_key_preimage())
}

/// Votes (or responses) needed out of `n`: `n/2 + n%2`, at least 1.
pub fn required_majority(n: usize) -> usize {
    (n / 2 + n % 2).max(1)
}

/// Consensus weight of `address` on the current chain.
///
/// `(block_count + 1 - last_minted) * available_balance`. Overflow saturates
/// to 1 so an overflowing validator still ranks.
pub fn node_weight(
    ledger: &LedgerState,
    pools: &MemPools,
    address: &Address,
) -> Result<u64, ConsensusError> {
    if !ledger.is_validator(address, false) {
        return Err(ConsensusError::NotEligible);
    }
    let last_minted = ledger
        .validator_info(address)
        .map(|info| info.last_minted_height)
        .ok_or(ConsensusError::NotEligible)?;

    let rounds = (ledger.block_count() + 1).saturating_sub(last_minted);
    let available = ledger
        .balance_of(address, pools.transactions(), None)
        .available;

    match rounds.checked_mul(available) {
        Some(0) => Err(ConsensusError::ZeroWeight),
        Some(weight) => Ok(weight),
        None => Ok(1),
    }
}

/// A pooled bid with its key and weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedBid {
    pub bid: NodeBid,
    pub hash: Hash,
    pub weight: u64,
}

/// Rank bids by weight descending, then bidder address ascending.
///
/// Bids whose bidder has no weight are left out.
pub fn rank_bids<'a, I, F>(bids: I, mut weight: F) -> Vec<RankedBid>
where
    I: IntoIterator<Item = &'a NodeBid>,
    F: FnMut(&Address) -> Result<u64, ConsensusError>,
{
    let mut ranked: Vec<RankedBid> = bids
        .into_iter()
        .filter_map(|bid| {
            let weight = weight(&bid.address).ok()?;
            Some(RankedBid {
                hash: bid_hash(bid),
                bid: bid.clone(),
                weight,
            })
        })
        .collect();
    ranked.sort_by(compare_ranked);
    ranked
}

fn compare_ranked(a: &RankedBid, b: &RankedBid) -> Ordering {
    b.weight
        .cmp(&a.weight)
        .then_with(|| a.bid.address.cmp(&b.bid.address))
}

/// Ranked list of the pooled bids on the current tip.
pub fn sorted_bid_list(ledger: &LedgerState, pools: &MemPools) -> Vec<RankedBid> {
    let tip = ledger.tip_hash();
    rank_bids(pools.bids_on(&tip), |address| {
        node_weight(ledger, pools, address)
    })
}

/// The bid that reached a voting majority, with the addresses that voted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusResult {
    pub winner: RankedBid,
    pub voters: Vec<Address>,
}

/// First ranked bid whose vote bucket holds at least `majority` votes.
///
/// Returns `None` while fewer than `majority` bids are ranked.
pub fn select_winner(
    ranked: &[RankedBid],
    pools: &MemPools,
    majority: usize,
) -> Option<ConsensusResult> {
    if ranked.len() < majority {
        return None;
    }
    ranked
        .iter()
        .find(|candidate| pools.vote_count(&candidate.hash) >= majority)
        .map(|winner| {
            let mut voters: Vec<Address> = pools
                .votes_for(&winner.hash)
                .map(|vote| vote.address)
                .collect();
            voters.sort();
            ConsensusResult {
                winner: winner.clone(),
                voters,
            }
        })
}

/// Sign a bid to mint the block after `last_block_hash`.
pub fn create_bid(signer: &dyn Signer, last_block_hash: Hash) -> Result<NodeBid, ChainError> {
    let mut bid = NodeBid {
        last_block_hash,
        address: signer.address(),
        signature: [0u8; 65],
    };
    bid.signature = signer.sign(&bid_hash(&bid))?;
    Ok(bid)
}

/// Sign a vote for `voted_for`'s bid on `last_block_hash`.
pub fn create_vote(
    signer: &dyn Signer,
    last_block_hash: Hash,
    voted_for: Address,
) -> Result<NodeVote, ChainError> {
    let mut vote = NodeVote {
        last_block_hash,
        address: signer.address(),
        voted_for,
        signature: [0u8; 65],
    };
    vote.signature = signer.sign(&vote_hash(&vote))?;
    Ok(vote)
}
