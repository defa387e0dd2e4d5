use std::collections::{BTreeMap, HashMap};

use tessera_types::block::Block;
use tessera_types::consensus::{NodeBid, NodeVote};
use tessera_types::primitives::{Address, BlockHeight, Hash, Nonce};
use tessera_types::transaction::Transaction;

use crate::consensus::{bid_hash, vote_bid_hash, vote_hash};
use crate::error::ChainError;
use crate::ledger::LedgerState;

/// A successful pool mutation, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    TransactionAdded(Hash),
    TransactionsRemoved(usize),
    BlockPooled(BlockHeight),
    BlockRemoved(BlockHeight),
    BidAdded(Hash),
    VoteAdded { bid: Hash, vote: Hash },
    VotingPruned { bids: usize, buckets: usize },
}

type Observer = Box<dyn Fn(&PoolEvent) + Send + Sync>;

/// The four pending pools: transactions, out-of-order blocks, bids and votes.
pub struct MemPools {
    transactions: HashMap<Hash, Transaction>,
    /// Blocks keyed by the height they claim.
    blocks: BTreeMap<BlockHeight, Block>,
    bids: HashMap<Hash, NodeBid>,
    /// Bid hash → vote hash → vote.
    votes: HashMap<Hash, HashMap<Hash, NodeVote>>,
    observers: Vec<Observer>,
}

impl Default for MemPools {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemPools")
            .field("transactions", &self.transactions.len())
            .field("blocks", &self.blocks.len())
            .field("bids", &self.bids.len())
            .field("vote_buckets", &self.votes.len())
            .finish()
    }
}

impl MemPools {
    pub fn new() -> Self {
        Self {
            transactions: HashMap::new(),
            blocks: BTreeMap::new(),
            bids: HashMap::new(),
            votes: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Register a callback invoked after every successful mutation.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(&PoolEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self, event: PoolEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    // ─── Transactions ────────────────────────────────────────────────────────

    /// Pool a transaction unless it is on-chain or already pooled.
    pub fn add_transaction(
        &mut self,
        tx: Transaction,
        ledger: &LedgerState,
    ) -> Result<(), ChainError> {
        if ledger.contains_transaction(&tx.hash) || self.transactions.contains_key(&tx.hash) {
            return Err(ChainError::Duplicate {
                kind: "transaction",
                hash: hex::encode(tx.hash),
            });
        }
        let hash = tx.hash;
        self.transactions.insert(hash, tx);
        self.notify(PoolEvent::TransactionAdded(hash));
        Ok(())
    }

    pub fn remove_transactions<'a>(&mut self, hashes: impl IntoIterator<Item = &'a Hash>) {
        let removed = hashes
            .into_iter()
            .filter(|hash| self.transactions.remove(*hash).is_some())
            .count();
        if removed > 0 {
            self.notify(PoolEvent::TransactionsRemoved(removed));
        }
    }

    pub fn contains_transaction(&self, hash: &Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn transaction(&self, hash: &Hash) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Pending transactions ready for the next block.
    ///
    /// Senders in address order; each sender contributes its pooled nonces
    /// `committed + 1, committed + 2, ...` up to the first gap. Entries that
    /// are already on-chain are evicted.
    pub fn sorted_transactions(&mut self, ledger: &LedgerState) -> Vec<Transaction> {
        self.clean_transactions(ledger);

        let mut by_sender: BTreeMap<Address, Vec<&Transaction>> = BTreeMap::new();
        for tx in self.transactions.values() {
            by_sender.entry(tx.from).or_default().push(tx);
        }

        let mut ready = Vec::new();
        for (sender, mut txs) in by_sender {
            txs.sort_by_key(|tx| tx.nonce);
            let mut expected = ledger.nonce(&sender).wrapping_add(1);
            for tx in txs {
                if tx.nonce != expected {
                    break;
                }
                ready.push(tx.clone());
                expected = expected.wrapping_add(1);
            }
        }
        ready
    }

    /// Next free nonce for `address`, counting pooled transactions.
    pub fn next_nonce(&self, address: &Address, ledger: &LedgerState) -> Nonce {
        let pooled = self
            .transactions
            .values()
            .filter(|tx| tx.from == *address)
            .map(|tx| tx.nonce)
            .max()
            .unwrap_or(0);
        ledger.nonce(address).max(pooled).saturating_add(1)
    }

    /// Drop transactions that made it on-chain. Returns how many were dropped.
    pub fn clean_transactions(&mut self, ledger: &LedgerState) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|hash, _| !ledger.contains_transaction(hash));
        let removed = before - self.transactions.len();
        if removed > 0 {
            self.notify(PoolEvent::TransactionsRemoved(removed));
        }
        removed
    }

    // ─── Blocks ──────────────────────────────────────────────────────────────

    /// Buffer a block for later replay.
    pub fn add_block(
        &mut self,
        height: BlockHeight,
        block: Block,
        ledger: &LedgerState,
    ) -> Result<(), ChainError> {
        if self.blocks.contains_key(&height) || ledger.contains_block(&block.hash) {
            return Err(ChainError::Duplicate {
                kind: "block",
                hash: hex::encode(block.hash),
            });
        }
        if height < ledger.block_count().saturating_sub(1) {
            return Err(ChainError::HeightBehind { height });
        }
        self.blocks.insert(height, block);
        self.notify(PoolEvent::BlockPooled(height));
        Ok(())
    }

    pub fn remove_block(&mut self, height: BlockHeight) -> Option<Block> {
        let block = self.blocks.remove(&height)?;
        self.notify(PoolEvent::BlockRemoved(height));
        Some(block)
    }

    /// Pooled blocks in height order.
    pub fn pooled_blocks(&self) -> impl Iterator<Item = (&BlockHeight, &Block)> {
        self.blocks.iter()
    }

    /// First pooled block in height order.
    pub fn first_pooled_block(&self) -> Option<(BlockHeight, &Block)> {
        self.blocks.iter().next().map(|(h, b)| (*h, b))
    }

    pub fn block_pool_is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drop pooled blocks that are already on-chain.
    pub fn prune_known_blocks(&mut self, ledger: &LedgerState) {
        let known: Vec<BlockHeight> = self
            .blocks
            .iter()
            .filter(|(_, block)| ledger.contains_block(&block.hash))
            .map(|(height, _)| *height)
            .collect();
        for height in known {
            self.remove_block(height);
        }
    }

    // ─── Bids ────────────────────────────────────────────────────────────────

    /// Pool a bid on the current tip and open its vote bucket.
    pub fn add_bid(&mut self, bid: NodeBid, ledger: &LedgerState) -> Result<Hash, ChainError> {
        if bid.last_block_hash != ledger.tip_hash() {
            return Err(ChainError::Stale {
                kind: "bid",
                last_hash: hex::encode(bid.last_block_hash),
            });
        }
        let hash = bid_hash(&bid);
        if self.bids.contains_key(&hash) {
            return Err(ChainError::Duplicate {
                kind: "bid",
                hash: hex::encode(hash),
            });
        }
        self.bids.insert(hash, bid);
        self.votes.entry(hash).or_default();
        self.notify(PoolEvent::BidAdded(hash));
        Ok(hash)
    }

    pub fn contains_bid(&self, hash: &Hash) -> bool {
        self.bids.contains_key(hash)
    }

    /// All pooled bids with their keys.
    pub fn bids(&self) -> impl Iterator<Item = (&Hash, &NodeBid)> {
        self.bids.iter()
    }

    /// Pooled bids built on `last_hash`.
    pub fn bids_on<'a>(&'a self, last_hash: &'a Hash) -> impl Iterator<Item = &'a NodeBid> {
        self.bids
            .values()
            .filter(move |bid| bid.last_block_hash == *last_hash)
    }

    // ─── Votes ───────────────────────────────────────────────────────────────

    /// Pool a vote on the current tip.
    pub fn add_vote(&mut self, vote: NodeVote, ledger: &LedgerState) -> Result<Hash, ChainError> {
        if vote.last_block_hash != ledger.tip_hash() {
            return Err(ChainError::Stale {
                kind: "vote",
                last_hash: hex::encode(vote.last_block_hash),
            });
        }
        if self.has_voted(&vote.address, &vote.last_block_hash) {
            return Err(ChainError::AlreadyVoted);
        }
        let bid = vote_bid_hash(&vote);
        let hash = vote_hash(&vote);
        let bucket = self.votes.entry(bid).or_default();
        if bucket.contains_key(&hash) {
            return Err(ChainError::Duplicate {
                kind: "vote",
                hash: hex::encode(hash),
            });
        }
        bucket.insert(hash, vote);
        self.notify(PoolEvent::VoteAdded { bid, vote: hash });
        Ok(hash)
    }

    /// Whether `address` already voted in the round on `last_hash`, in any bucket.
    pub fn has_voted(&self, address: &Address, last_hash: &Hash) -> bool {
        self.votes
            .values()
            .flat_map(|bucket| bucket.values())
            .any(|vote| vote.address == *address && vote.last_block_hash == *last_hash)
    }

    pub fn contains_vote(&self, bid: &Hash, vote: &Hash) -> bool {
        self.votes
            .get(bid)
            .map(|bucket| bucket.contains_key(vote))
            .unwrap_or(false)
    }

    pub fn vote_count(&self, bid: &Hash) -> usize {
        self.votes.get(bid).map(HashMap::len).unwrap_or(0)
    }

    pub fn votes_for<'a>(&'a self, bid: &Hash) -> impl Iterator<Item = &'a NodeVote> {
        self.votes.get(bid).into_iter().flat_map(|bucket| bucket.values())
    }

    /// All vote buckets keyed by bid hash.
    pub fn vote_buckets(&self) -> impl Iterator<Item = (&Hash, &HashMap<Hash, NodeVote>)> {
        self.votes.iter()
    }

    /// Discard bids and vote buckets of rounds already resolved on-chain:
    /// built on a known block that is no longer the tip.
    pub fn clean_voting(&mut self, ledger: &LedgerState) {
        let tip = ledger.tip_hash();
        let resolved = |last: &Hash| *last != tip && ledger.contains_block(last);

        let stale_bids: Vec<Hash> = self
            .bids
            .iter()
            .filter(|(_, bid)| resolved(&bid.last_block_hash))
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &stale_bids {
            self.bids.remove(hash);
        }

        let before = self.votes.len();
        self.votes.retain(|bid, bucket| {
            !stale_bids.contains(bid)
                && !bucket
                    .values()
                    .any(|vote| resolved(&vote.last_block_hash))
        });
        let buckets = before - self.votes.len();

        if !stale_bids.is_empty() || buckets > 0 {
            tracing::debug!(
                bids = stale_bids.len(),
                buckets,
                "pruned resolved voting rounds"
            );
            self.notify(PoolEvent::VotingPruned {
                bids: stale_bids.len(),
                buckets,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{build_block, genesis_block};
    use crate::consensus::{create_bid, create_vote};
    use crate::transaction::create_transfer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tessera_crypto::keys::Keypair;
    use tessera_types::constants::TOTAL_SUPPLY;

    fn setup(n: u8) -> (Vec<Keypair>, LedgerState) {
        let keys: Vec<Keypair> = (1..=n)
            .map(|i| Keypair::from_seed(&[i; 32]).unwrap())
            .collect();
        let addrs: Vec<Address> = keys.iter().map(|k| k.address()).collect();
        let ledger = LedgerState::new(genesis_block(&addrs, TOTAL_SUPPLY)).unwrap();
        (keys, ledger)
    }

    fn commit(ledger: &mut LedgerState, minter: &Keypair, txs: Vec<Transaction>) -> Block {
        let block = build_block(minter, ledger.tip_hash(), txs, vec![], 1).unwrap();
        ledger.apply_block(block.clone()).unwrap();
        block
    }

    #[test]
    fn test_transaction_duplicates_rejected() {
        let (keys, mut ledger) = setup(2);
        let mut pools = MemPools::new();
        let tx = create_transfer(&keys[0], 1, [1u8; 20], 10).unwrap();
        pools.add_transaction(tx.clone(), &ledger).unwrap();
        assert!(pools.add_transaction(tx.clone(), &ledger).is_err());

        commit(&mut ledger, &keys[1], vec![tx.clone()]);
        let mut fresh = MemPools::new();
        assert!(matches!(
            fresh.add_transaction(tx, &ledger),
            Err(ChainError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_sorted_transactions_stop_at_gap() {
        let (keys, ledger) = setup(2);
        let mut pools = MemPools::new();
        for nonce in [1, 2, 4] {
            let tx = create_transfer(&keys[0], nonce, [1u8; 20], 10).unwrap();
            pools.add_transaction(tx, &ledger).unwrap();
        }
        let tx = create_transfer(&keys[1], 2, [1u8; 20], 10).unwrap();
        pools.add_transaction(tx, &ledger).unwrap();

        let ready = pools.sorted_transactions(&ledger);
        let nonces: Vec<(Address, Nonce)> = ready.iter().map(|tx| (tx.from, tx.nonce)).collect();
        assert_eq!(nonces, vec![(keys[0].address(), 1), (keys[0].address(), 2)]);
        assert_eq!(pools.transaction_count(), 4);
        assert_eq!(pools.next_nonce(&keys[0].address(), &ledger), 5);
        assert_eq!(pools.next_nonce(&[9u8; 20], &ledger), 1);
    }

    #[test]
    fn test_sorted_transactions_evicts_committed() {
        let (keys, mut ledger) = setup(2);
        let mut pools = MemPools::new();
        let first = create_transfer(&keys[0], 1, [1u8; 20], 10).unwrap();
        let second = create_transfer(&keys[0], 2, [1u8; 20], 10).unwrap();
        pools.add_transaction(first.clone(), &ledger).unwrap();
        pools.add_transaction(second.clone(), &ledger).unwrap();

        commit(&mut ledger, &keys[1], vec![first]);
        let ready = pools.sorted_transactions(&ledger);
        assert_eq!(ready, vec![second]);
        assert_eq!(pools.transaction_count(), 1);
    }

    #[test]
    fn test_block_pool_rules() {
        let (keys, mut ledger) = setup(2);
        let mut pools = MemPools::new();
        let genesis = ledger.tip().cloned().unwrap();
        assert!(pools.add_block(0, genesis, &ledger).is_err());

        let b1 = commit(&mut ledger, &keys[1], vec![]);
        let b2 = commit(&mut ledger, &keys[1], vec![]);
        let mut far = b2.clone();
        far.hash = [7u8; 32];
        assert!(matches!(
            pools.add_block(0, far.clone(), &ledger),
            Err(ChainError::HeightBehind { height: 0 })
        ));
        assert!(pools.add_block(1, b1, &ledger).is_err());
        pools.add_block(5, far.clone(), &ledger).unwrap();
        far.hash = [8u8; 32];
        assert!(pools.add_block(5, far, &ledger).is_err());
        assert_eq!(pools.first_pooled_block().map(|(h, _)| h), Some(5));
    }

    #[test]
    fn test_bid_pool_rejects_stale_and_duplicate() {
        let (keys, ledger) = setup(2);
        let mut pools = MemPools::new();
        let tip = ledger.tip_hash();

        let stale = create_bid(&keys[0], [3u8; 32]).unwrap();
        assert!(matches!(
            pools.add_bid(stale, &ledger),
            Err(ChainError::Stale { .. })
        ));

        let bid = create_bid(&keys[0], tip).unwrap();
        let hash = pools.add_bid(bid.clone(), &ledger).unwrap();
        assert!(pools.add_bid(bid, &ledger).is_err());
        assert!(pools.contains_bid(&hash));
        assert_eq!(pools.vote_count(&hash), 0);
        assert_eq!(pools.bids_on(&tip).count(), 1);
    }

    #[test]
    fn test_second_vote_same_round_rejected() {
        let (keys, ledger) = setup(3);
        let mut pools = MemPools::new();
        let tip = ledger.tip_hash();

        let vote = create_vote(&keys[2], tip, keys[0].address()).unwrap();
        pools.add_vote(vote, &ledger).unwrap();
        let other = create_vote(&keys[2], tip, keys[1].address()).unwrap();
        assert!(matches!(
            pools.add_vote(other, &ledger),
            Err(ChainError::AlreadyVoted)
        ));
        assert!(pools.has_voted(&keys[2].address(), &tip));
        assert!(!pools.has_voted(&keys[1].address(), &tip));
    }

    #[test]
    fn test_clean_voting_drops_resolved_rounds() {
        let (keys, mut ledger) = setup(3);
        let mut pools = MemPools::new();
        let old_tip = ledger.tip_hash();
        let bid = pools
            .add_bid(create_bid(&keys[0], old_tip).unwrap(), &ledger)
            .unwrap();
        pools
            .add_vote(
                create_vote(&keys[1], old_tip, keys[0].address()).unwrap(),
                &ledger,
            )
            .unwrap();

        pools.clean_voting(&ledger);
        assert!(pools.contains_bid(&bid));

        commit(&mut ledger, &keys[0], vec![]);
        pools.clean_voting(&ledger);
        assert!(!pools.contains_bid(&bid));
        assert_eq!(pools.vote_buckets().count(), 0);
    }

    #[test]
    fn test_observers_see_mutations() {
        let (keys, ledger) = setup(1);
        let mut pools = MemPools::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        pools.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let tx = create_transfer(&keys[0], 1, [1u8; 20], 10).unwrap();
        pools.add_transaction(tx.clone(), &ledger).unwrap();
        let _ = pools.add_transaction(tx.clone(), &ledger);
        pools.remove_transactions([&tx.hash]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
