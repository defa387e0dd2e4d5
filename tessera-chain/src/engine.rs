use std::collections::HashSet;

use tessera_crypto::signer::Signer;
use tessera_storage::traits::{LedgerStore, PeerRecord};
use tessera_types::block::Block;
use tessera_types::consensus::{NodeBid, NodeVote, VotingPoolDelta, VotingPoolDigest};
use tessera_types::constants::TX_THRESHOLD;
use tessera_types::primitives::*;
use tessera_types::transaction::Transaction;

use crate::block::{build_block, genesis_block};
use crate::consensus::{
    create_bid, create_vote, node_weight, required_majority, select_winner, sorted_bid_list,
};
use crate::error::ChainError;
use crate::ledger::{Balance, LedgerState, ValidatorInfo};
use crate::mempool::MemPools;
use crate::sync::{backfill_plan, BlockRange, SyncCoordinator, SyncDecision, SyncPhase};
use crate::transaction::{create_add_validator, create_remove_validator, create_transfer};
use crate::validation::{check_batch, verify_bid, verify_block, verify_transaction, verify_vote};

/// A message the engine wants broadcast to every peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Bid(NodeBid),
    Vote(NodeVote),
    Block { height: BlockHeight, block: Block },
    Transaction(Transaction),
}

/// What happened to a block shared by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Already known, or the node is not synchronized.
    Ignored,
    /// Committed at `height`. `outbound` holds the follow-up bid, if any.
    Committed {
        height: BlockHeight,
        outbound: Vec<Outbound>,
    },
}

/// What the node should do after a sync response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Keep waiting for responses.
    Wait,
    /// Synchronized; broadcast `outbound`.
    InSync(Vec<Outbound>),
    /// Request these ranges from random peers.
    Backfill(Vec<BlockRange>),
}

/// The chain state machine: ledger, pools, sync state and the node's key.
pub struct ChainEngine {
    ledger: LedgerState,
    pools: MemPools,
    sync: SyncCoordinator,
    synchronized: bool,
    signer: Box<dyn Signer>,
    store: Box<dyn LedgerStore>,
}

impl ChainEngine {
    /// Open the chain from `store`, writing the genesis block for
    /// `genesis_validators` if the store is empty.
    pub fn open(
        signer: Box<dyn Signer>,
        store: Box<dyn LedgerStore>,
        genesis_validators: &[Address],
        supply: Amount,
    ) -> Result<Self, ChainError> {
        let genesis = genesis_block(genesis_validators, supply);
        let blocks = store.select_all_blocks()?;

        let ledger = if blocks.is_empty() {
            store.insert_block(0, &genesis)?;
            tracing::info!(hash = %hex::encode(genesis.hash), "wrote genesis block");
            LedgerState::new(genesis)?
        } else {
            if blocks[0].hash != genesis.hash {
                return Err(ChainError::InvalidBlock {
                    reason: format!(
                        "stored genesis {} does not match configured genesis {}",
                        hex::encode(blocks[0].hash),
                        hex::encode(genesis.hash)
                    ),
                });
            }
            let count = blocks.len();
            let ledger = LedgerState::replay(blocks)?;
            tracing::info!(blocks = count, "replayed stored chain");
            ledger
        };

        Ok(Self {
            ledger,
            pools: MemPools::new(),
            sync: SyncCoordinator::default(),
            synchronized: false,
            signer,
            store,
        })
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn ledger(&self) -> &LedgerState {
        &self.ledger
    }

    pub fn pools(&self) -> &MemPools {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut MemPools {
        &mut self.pools
    }

    pub fn head(&self) -> (BlockHeight, Hash) {
        self.ledger.head()
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.sync.phase()
    }

    /// Declare the node synchronized without a negotiation round.
    pub fn mark_synchronized(&mut self) {
        self.synchronized = true;
        self.sync.mark_in_sync();
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn balance_of(&self, address: &Address) -> Balance {
        self.ledger
            .balance_of(address, self.pools.transactions(), None)
    }

    pub fn next_nonce(&self, address: &Address) -> Nonce {
        self.pools.next_nonce(address, &self.ledger)
    }

    pub fn validators(&self) -> Vec<(Address, ValidatorInfo)> {
        self.ledger
            .validators()
            .map(|(address, info)| (*address, *info))
            .collect()
    }

    /// Up to `count` committed blocks from `start`.
    pub fn blocks(&self, start: BlockHeight, count: u64) -> Vec<Block> {
        self.ledger.blocks_range(start, count).to_vec()
    }

    pub fn transaction(&self, hash: &Hash) -> Option<(BlockHeight, Transaction)> {
        self.ledger
            .transaction(hash)
            .map(|(height, tx)| (height, tx.clone()))
    }

    // ─── Commit ──────────────────────────────────────────────────────────────

    /// Batch-check, apply, persist and clean up after a block that extends
    /// the tip.
    fn commit_block(&mut self, block: Block) -> Result<BlockHeight, ChainError> {
        check_batch(&block.transactions, &self.ledger)?;
        let height = self.ledger.apply_block(block)?;

        let block = self
            .ledger
            .block(height)
            .ok_or_else(|| ChainError::InvalidBlock {
                reason: format!("block {height} missing after commit"),
            })?;
        if let Err(e) = self.store.insert_block(height, block) {
            tracing::error!(height, error = %e, "failed to persist committed block");
            return Err(e.into());
        }
        let hashes: Vec<Hash> = block.transaction_hashes().copied().collect();
        tracing::info!(
            height,
            hash = %hex::encode(block.hash),
            validator = %hex::encode(block.validator),
            txs = hashes.len(),
            "committed block"
        );
        self.pools.remove_transactions(&hashes);
        Ok(height)
    }

    /// Pool and return a bid on the tip if this node can bid.
    fn bid_on_tip(&mut self) -> Option<Outbound> {
        let me = self.address();
        if let Err(e) = node_weight(&self.ledger, &self.pools, &me) {
            tracing::trace!(reason = %e, "not bidding");
            return None;
        }
        let bid = match create_bid(self.signer.as_ref(), self.ledger.tip_hash()) {
            Ok(bid) => bid,
            Err(e) => {
                tracing::error!(error = %e, "failed to sign bid");
                return None;
            }
        };
        self.pools
            .add_bid(bid.clone(), &self.ledger)
            .ok()
            .map(|_| Outbound::Bid(bid))
    }

    // ─── Inbound ─────────────────────────────────────────────────────────────

    /// Verify and pool a transaction received from a peer.
    pub fn handle_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        verify_transaction(&tx, &self.ledger, &self.pools)?;
        self.pools.add_transaction(tx, &self.ledger)
    }

    pub fn handle_bid(&mut self, bid: NodeBid) -> Result<(), ChainError> {
        verify_bid(&bid)?;
        self.pools.add_bid(bid, &self.ledger).map(|_| ())
    }

    pub fn handle_vote(&mut self, vote: NodeVote) -> Result<(), ChainError> {
        verify_vote(&vote, &self.ledger)?;
        self.pools.add_vote(vote, &self.ledger).map(|_| ())
    }

    /// A single block shared by a peer at `height`.
    pub fn handle_incoming_block(
        &mut self,
        height: BlockHeight,
        block: Block,
    ) -> Result<BlockOutcome, ChainError> {
        if !self.synchronized {
            return Ok(BlockOutcome::Ignored);
        }
        if let Some(existing) = self.ledger.block(height) {
            if existing.hash == block.hash {
                return Ok(BlockOutcome::Ignored);
            }
            return Err(ChainError::InvalidBlock {
                reason: format!("conflicts with committed block {height}"),
            });
        }
        if !self.ledger.is_next_block(&block) {
            return Err(ChainError::ParentMismatch {
                expected: hex::encode(self.ledger.tip_hash()),
                actual: hex::encode(block.last_hash),
            });
        }
        verify_block(&block, &self.ledger, &self.pools)?;
        let height = self.commit_block(block)?;
        Ok(BlockOutcome::Committed {
            height,
            outbound: self.bid_on_tip().into_iter().collect(),
        })
    }

    /// A batch of back-filled blocks. Each block is checked on its own and
    /// pooled, then the pool is replayed.
    pub fn handle_incoming_blocks(
        &mut self,
        blocks: Vec<(BlockHeight, Block)>,
    ) -> Result<Vec<Outbound>, ChainError> {
        for (height, block) in blocks {
            if let Some(existing) = self.ledger.block(height) {
                if existing.hash != block.hash {
                    return Err(ChainError::InvalidBlock {
                        reason: format!("conflicts with committed block {height}"),
                    });
                }
                continue;
            }
            if height != 0 {
                verify_block(&block, &self.ledger, &self.pools)?;
            }
            if let Err(e) = self.pools.add_block(height, block, &self.ledger) {
                tracing::debug!(height, reason = %e, "block not pooled");
            }
        }
        Ok(self.process_block_pool())
    }

    /// Apply pooled blocks that extend the tip, in height order. Stops at the
    /// first gap or failure; the failing block is dropped.
    pub fn process_block_pool(&mut self) -> Vec<Outbound> {
        self.pools.prune_known_blocks(&self.ledger);

        while let Some((height, block)) = self.pools.first_pooled_block() {
            if height < self.ledger.block_count() {
                tracing::debug!(height, "dropping pooled block from a stale branch");
                self.pools.remove_block(height);
                continue;
            }
            if !self.ledger.is_next_block(block) {
                break;
            }
            let Some(block) = self.pools.remove_block(height) else {
                break;
            };
            if let Err(e) = self.commit_block(block) {
                tracing::warn!(height, reason = %e, "pooled block rejected");
                break;
            }
        }

        self.synchronized = self.pools.block_pool_is_empty();
        if !self.synchronized {
            return Vec::new();
        }
        self.sync.mark_in_sync();
        self.bid_on_tip().into_iter().collect()
    }

    // ─── Consensus ───────────────────────────────────────────────────────────

    /// One consensus round at time `now`. Only runs while synchronized.
    pub fn check_consensus(&mut self, now: Timestamp) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        if !self.synchronized {
            return outbound;
        }
        let me = self.address();
        let tip = self.ledger.tip_hash();

        outbound.extend(self.bid_on_tip());

        let majority = required_majority(self.ledger.eligible_validator_count());
        let ranked = sorted_bid_list(&self.ledger, &self.pools);
        if ranked.len() < majority {
            return outbound;
        }

        let leader = ranked[0].bid.address;
        if self.pools.transaction_count() >= TX_THRESHOLD
            && leader != me
            && self.ledger.is_validator(&me, false)
            && !self.pools.has_voted(&me, &tip)
        {
            match create_vote(self.signer.as_ref(), tip, leader) {
                Ok(vote) => {
                    if self.pools.add_vote(vote.clone(), &self.ledger).is_ok() {
                        tracing::debug!(leader = %hex::encode(leader), "voted");
                        outbound.push(Outbound::Vote(vote));
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to sign vote"),
            }
        }

        let Some(result) = select_winner(&ranked, &self.pools, majority) else {
            return outbound;
        };
        if result.winner.bid.address != me {
            return outbound;
        }

        let transactions = self.pools.sorted_transactions(&self.ledger);
        if transactions.len() < TX_THRESHOLD {
            return outbound;
        }
        match self.mint(tip, transactions, result.voters, now) {
            Ok(minted) => outbound.extend(minted),
            Err(e) => tracing::error!(error = %e, "abandoned minted block"),
        }
        outbound
    }

    fn mint(
        &mut self,
        tip: Hash,
        transactions: Vec<Transaction>,
        sponsors: Vec<Address>,
        now: Timestamp,
    ) -> Result<Vec<Outbound>, ChainError> {
        let block = build_block(self.signer.as_ref(), tip, transactions, sponsors, now)?;
        verify_block(&block, &self.ledger, &self.pools)?;
        let height = self.commit_block(block.clone())?;
        tracing::info!(height, "minted block");

        let mut outbound = vec![Outbound::Block { height, block }];
        outbound.extend(self.bid_on_tip());
        Ok(outbound)
    }

    // ─── Sync ────────────────────────────────────────────────────────────────

    /// Start a height negotiation expecting `expected` peer responses.
    pub fn initiate_sync(&mut self, expected: usize) {
        let (height, hash) = self.ledger.head();
        self.sync.initiate(expected, height, hash);
    }

    pub fn handle_sync_response(
        &mut self,
        height: BlockHeight,
        hash: Hash,
        peer: PeerId,
    ) -> SyncAction {
        match self.sync.record_response(height, hash, peer) {
            SyncDecision::Pending => SyncAction::Wait,
            SyncDecision::InSync => {
                self.synchronized = true;
                SyncAction::InSync(self.bid_on_tip().into_iter().collect())
            }
            SyncDecision::OutOfSync { target, needed } => {
                self.synchronized = false;
                self.sync.begin_backfill();
                tracing::info!(target, needed, "chain behind peers, backfilling");
                SyncAction::Backfill(backfill_plan(target, needed))
            }
        }
    }

    // ─── Pool Sync ───────────────────────────────────────────────────────────

    pub fn transaction_hashes(&self) -> Vec<Hash> {
        self.pools.transactions().map(|tx| tx.hash).collect()
    }

    /// Pooled transactions not in `known`.
    pub fn missing_transactions(&self, known: &[Hash]) -> Vec<Transaction> {
        let known: HashSet<&Hash> = known.iter().collect();
        self.pools
            .transactions()
            .filter(|tx| !known.contains(&tx.hash))
            .cloned()
            .collect()
    }

    /// Verify and pool transactions from a pool-sync response. Returns how
    /// many were new.
    pub fn merge_transactions(&mut self, transactions: Vec<Transaction>) -> usize {
        transactions
            .into_iter()
            .filter(|tx| {
                let hash = tx.hash;
                match self.handle_transaction(tx.clone()) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(hash = %hex::encode(hash), reason = %e, "skipped synced transaction");
                        false
                    }
                }
            })
            .count()
    }

    pub fn voting_digest(&self) -> VotingPoolDigest {
        VotingPoolDigest {
            bid_hashes: self.pools.bids().map(|(hash, _)| *hash).collect(),
            buckets: self
                .pools
                .vote_buckets()
                .map(|(bid, bucket)| (*bid, bucket.keys().copied().collect()))
                .collect(),
        }
    }

    /// Bids and votes the holder of `digest` lacks, including whole buckets
    /// it did not mention.
    pub fn missing_voting(&self, digest: &VotingPoolDigest) -> VotingPoolDelta {
        let known_bids: HashSet<&Hash> = digest.bid_hashes.iter().collect();
        let bids = self
            .pools
            .bids()
            .filter(|(hash, _)| !known_bids.contains(hash))
            .map(|(_, bid)| bid.clone())
            .collect();

        let buckets = self
            .pools
            .vote_buckets()
            .filter_map(|(bid, bucket)| {
                let known: HashSet<&Hash> = digest
                    .buckets
                    .iter()
                    .find(|(hash, _)| hash == bid)
                    .map(|(_, votes)| votes.iter().collect())
                    .unwrap_or_default();
                let missing: Vec<NodeVote> = bucket
                    .iter()
                    .filter(|(hash, _)| !known.contains(hash))
                    .map(|(_, vote)| vote.clone())
                    .collect();
                (!missing.is_empty()).then_some(missing)
            })
            .collect();

        VotingPoolDelta { bids, buckets }
    }

    /// Verify and pool bids and votes from a pool-sync response. Returns how
    /// many were new.
    pub fn merge_voting(&mut self, delta: VotingPoolDelta) -> usize {
        let mut accepted = 0;
        for bid in delta.bids {
            if self.handle_bid(bid).is_ok() {
                accepted += 1;
            }
        }
        for vote in delta.buckets.into_iter().flatten() {
            if self.handle_vote(vote).is_ok() {
                accepted += 1;
            }
        }
        accepted
    }

    /// Sweep committed transactions, and resolved voting rounds when synchronized.
    pub fn clean_pools(&mut self) {
        let removed = self.pools.clean_transactions(&self.ledger);
        if removed > 0 {
            tracing::debug!(removed, "swept committed transactions");
        }
        if self.synchronized {
            self.pools.clean_voting(&self.ledger);
        }
    }

    // ─── Local Transactions ──────────────────────────────────────────────────

    fn submit(&mut self, tx: Transaction) -> Result<Outbound, ChainError> {
        verify_transaction(&tx, &self.ledger, &self.pools)?;
        self.pools.add_transaction(tx.clone(), &self.ledger)?;
        tracing::info!(hash = %hex::encode(tx.hash), nonce = tx.nonce, "submitted transaction");
        Ok(Outbound::Transaction(tx))
    }

    /// Transfer `amount` from this node's account.
    pub fn submit_transfer(&mut self, to: Address, amount: Amount) -> Result<Outbound, ChainError> {
        let nonce = self.next_nonce(&self.address());
        let tx = create_transfer(self.signer.as_ref(), nonce, to, amount)?;
        self.submit(tx)
    }

    pub fn submit_add_validator(&mut self) -> Result<Outbound, ChainError> {
        let nonce = self.next_nonce(&self.address());
        let tx = create_add_validator(self.signer.as_ref(), nonce)?;
        self.submit(tx)
    }

    pub fn submit_remove_validator(&mut self) -> Result<Outbound, ChainError> {
        let nonce = self.next_nonce(&self.address());
        let tx = create_remove_validator(self.signer.as_ref(), nonce)?;
        self.submit(tx)
    }

    // ─── Peers ───────────────────────────────────────────────────────────────

    pub fn record_peer(&self, endpoint: &str, now: Timestamp) -> Result<(), ChainError> {
        self.store.upsert_peer(&PeerRecord {
            endpoint: endpoint.to_string(),
            last_seen: now,
        })?;
        Ok(())
    }

    pub fn recent_peers(&self, limit: usize) -> Result<Vec<PeerRecord>, ChainError> {
        Ok(self.store.recent_peers(limit)?)
    }
}
