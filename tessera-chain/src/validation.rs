use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use tessera_crypto::keys::recover;
use tessera_types::block::Block;
use tessera_types::consensus::{NodeBid, NodeVote};
use tessera_types::constants::{BLOCK_VERSION, MAX_VALIDATOR_SLOTS, TX_THRESHOLD, VALIDATOR_STAKE};
use tessera_types::primitives::{Address, Hash, Signature};
use tessera_types::transaction::{Transaction, TransactionType};

use crate::block::compute_block_hash;
use crate::consensus::{bid_hash, vote_hash};
use crate::error::ChainError;
use crate::ledger::LedgerState;
use crate::mempool::MemPools;
use crate::transaction::compute_tx_hash;

fn invalid_tx(reason: impl Into<String>) -> ChainError {
    ChainError::InvalidTransaction {
        reason: reason.into(),
    }
}

fn invalid_block(reason: impl Into<String>) -> ChainError {
    ChainError::InvalidBlock {
        reason: reason.into(),
    }
}

fn recover_signer(digest: &Hash, signature: &Signature) -> Result<Address, String> {
    recover(digest, signature).map_err(|e| e.to_string())
}

/// Verify a transaction against the committed state and the pending pool.
pub fn verify_transaction(
    tx: &Transaction,
    ledger: &LedgerState,
    pools: &MemPools,
) -> Result<(), ChainError> {
    if compute_tx_hash(tx) != tx.hash {
        return Err(invalid_tx("hash mismatch"));
    }
    let schedule = tx.tx_type.schedule();
    if tx.fee < schedule.fee {
        return Err(invalid_tx(format!(
            "fee {} below schedule {}",
            tx.fee, schedule.fee
        )));
    }
    let signer = recover_signer(&tx.hash, &tx.signature).map_err(invalid_tx)?;
    if signer != tx.from {
        return Err(invalid_tx("signature does not match sender"));
    }
    if tx.data.len() != schedule.data_size {
        return Err(invalid_tx(format!(
            "data is {} bytes, expected {}",
            tx.data.len(),
            schedule.data_size
        )));
    }
    let committed = ledger.nonce(&tx.from);
    if tx.nonce <= committed {
        return Err(ChainError::NonceMismatch {
            expected: committed.saturating_add(1),
            actual: tx.nonce,
        });
    }

    let available = ledger
        .balance_of(&tx.from, pools.transactions(), Some(&tx.hash))
        .available;
    let required = match tx.tx_type {
        TransactionType::Transfer => tx.total_cost(),
        TransactionType::AddValidator => {
            if ledger.is_validator(&tx.from, true) {
                return Err(invalid_tx("sender is already a validator"));
            }
            if ledger.registered_validator_count() >= MAX_VALIDATOR_SLOTS {
                return Err(invalid_tx("no free validator slot"));
            }
            VALIDATOR_STAKE.checked_add(tx.fee)
        }
        TransactionType::RemoveValidator => {
            if !ledger.is_validator(&tx.from, true) {
                return Err(invalid_tx("sender is not a validator"));
            }
            Some(tx.fee)
        }
    };
    // Overflow counts as unaffordable.
    let required = required.unwrap_or(u64::MAX);
    if required > available {
        return Err(ChainError::InsufficientBalance {
            available,
            required,
        });
    }
    Ok(())
}

/// Verify a block's header, signer, sponsors and every transaction.
///
/// Transactions are verified in parallel; all run to completion before the
/// first failure (in block order) is reported.
pub fn verify_block(
    block: &Block,
    ledger: &LedgerState,
    pools: &MemPools,
) -> Result<(), ChainError> {
    if block.version != BLOCK_VERSION {
        return Err(invalid_block(format!(
            "unsupported version {}",
            block.version
        )));
    }
    if block.transactions.len() < TX_THRESHOLD {
        return Err(invalid_block(format!(
            "{} transactions, need at least {TX_THRESHOLD}",
            block.transactions.len()
        )));
    }
    if compute_block_hash(block) != block.hash {
        return Err(invalid_block("hash mismatch"));
    }
    let signer = recover_signer(&block.hash, &block.signature).map_err(invalid_block)?;
    if signer != block.validator {
        return Err(invalid_block("signature does not match validator"));
    }
    if !ledger.is_validator(&block.validator, false) {
        return Err(invalid_block("minter is not an eligible validator"));
    }
    for sponsor in &block.sponsors {
        if *sponsor == block.validator {
            return Err(invalid_block("minter cannot sponsor its own block"));
        }
        if !ledger.is_validator(sponsor, false) {
            return Err(invalid_block(format!(
                "sponsor {} is not an eligible validator",
                hex::encode(sponsor)
            )));
        }
    }

    let results: Vec<Result<(), ChainError>> = block
        .transactions
        .par_iter()
        .map(|tx| verify_transaction(tx, ledger, pools))
        .collect();
    results.into_iter().collect()
}

/// Each sender's transactions, in order, must continue its committed nonce
/// without gaps.
pub fn check_nonce_sequence(
    transactions: &[Transaction],
    ledger: &LedgerState,
) -> Result<(), ChainError> {
    let mut next: HashMap<Address, u32> = HashMap::new();
    for tx in transactions {
        let expected = next
            .entry(tx.from)
            .or_insert_with(|| ledger.nonce(&tx.from).wrapping_add(1));
        if tx.nonce != *expected {
            return Err(ChainError::NonceMismatch {
                expected: *expected,
                actual: tx.nonce,
            });
        }
        *expected = expected.wrapping_add(1);
    }
    Ok(())
}

/// Net Transfer deltas across the batch must leave every balance non-negative.
pub fn check_balance_transfers(
    transactions: &[Transaction],
    ledger: &LedgerState,
) -> Result<(), ChainError> {
    let mut deltas: HashMap<Address, i128> = HashMap::new();
    for tx in transactions
        .iter()
        .filter(|tx| tx.tx_type == TransactionType::Transfer)
    {
        let amount = tx.amount().ok_or_else(|| invalid_tx("malformed amount"))? as i128;
        *deltas.entry(tx.from).or_default() -= amount + tx.fee as i128;
        *deltas.entry(tx.to).or_default() += amount;
    }
    for (address, delta) in deltas {
        let balance = ledger.account(&address).balance as i128;
        if balance + delta < 0 {
            return Err(ChainError::InsufficientBalance {
                available: u64::try_from(balance).unwrap_or(u64::MAX),
                required: u64::try_from(-delta).unwrap_or(u64::MAX),
            });
        }
    }
    Ok(())
}

/// No transaction may already be on-chain or appear twice in the batch.
pub fn check_unique_hashes(
    transactions: &[Transaction],
    ledger: &LedgerState,
) -> Result<(), ChainError> {
    let mut seen = HashSet::with_capacity(transactions.len());
    for tx in transactions {
        if ledger.contains_transaction(&tx.hash) || !seen.insert(tx.hash) {
            return Err(ChainError::Duplicate {
                kind: "transaction",
                hash: hex::encode(tx.hash),
            });
        }
    }
    Ok(())
}

/// All batch checks run before a block is committed.
pub fn check_batch(transactions: &[Transaction], ledger: &LedgerState) -> Result<(), ChainError> {
    check_unique_hashes(transactions, ledger)?;
    check_nonce_sequence(transactions, ledger)?;
    check_balance_transfers(transactions, ledger)
}

/// A bid must be signed by its bidder.
pub fn verify_bid(bid: &NodeBid) -> Result<(), ChainError> {
    let signer = recover_signer(&bid_hash(bid), &bid.signature)
        .map_err(|reason| ChainError::InvalidBid { reason })?;
    if signer != bid.address {
        return Err(ChainError::InvalidBid {
            reason: "signature does not match bidder".to_string(),
        });
    }
    Ok(())
}

/// A vote must be signed by an eligible validator voting for someone else.
pub fn verify_vote(vote: &NodeVote, ledger: &LedgerState) -> Result<(), ChainError> {
    let invalid = |reason: &str| ChainError::InvalidVote {
        reason: reason.to_string(),
    };
    let signer = recover_signer(&vote_hash(vote), &vote.signature)
        .map_err(|reason| ChainError::InvalidVote { reason })?;
    if signer != vote.address {
        return Err(invalid("signature does not match voter"));
    }
    if vote.address == vote.voted_for {
        return Err(invalid("validators cannot vote for themselves"));
    }
    if !ledger.is_validator(&vote.address, false) {
        return Err(invalid("voter is not an eligible validator"));
    }
    Ok(())
}
