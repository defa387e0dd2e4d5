use tessera_crypto::hash::keccak256;
use tessera_crypto::signer::Signer;
use tessera_types::block::Block;
use tessera_types::constants::{BLOCK_VERSION, TRANSACTION_VERSION, TRANSFER_FEE, VALIDATOR_FEE};
use tessera_types::primitives::*;
use tessera_types::transaction::{sort_transactions, Transaction, TransactionType};

use crate::error::ChainError;
use crate::transaction::compute_tx_hash;

/// Keccak-256 over the block's canonical preimage. Independent of the order
/// in which transactions are stored.
pub fn compute_block_hash(block: &Block) -> Hash {
    keccak256(&block.hash_preimage())
}

/// Assemble and sign a block on top of `last_hash`.
///
/// Transactions are put in canonical order, the hash is computed over the
/// result and the signer signs the hash.
pub fn build_block(
    signer: &dyn Signer,
    last_hash: Hash,
    mut transactions: Vec<Transaction>,
    sponsors: Vec<Address>,
    timestamp: Timestamp,
) -> Result<Block, ChainError> {
    sort_transactions(&mut transactions);

    let mut block = Block {
        version: BLOCK_VERSION,
        timestamp,
        last_hash,
        hash: ZERO_HASH,
        validator: signer.address(),
        signature: EMPTY_SIGNATURE,
        transactions,
        sponsors,
    };

    block.hash = compute_block_hash(&block);
    block.signature = signer.sign(&block.hash)?;
    Ok(block)
}

/// The deterministic genesis block for a validator set.
///
/// For validator `i` the block carries a Transfer of `supply` from the zero
/// address (nonce `i`) and an AddValidator from the validator itself
/// (nonce 0). Genesis is unsigned, has no parent, no minter and timestamp 0.
pub fn genesis_block(validators: &[Address], supply: Amount) -> Block {
    let mut transactions = Vec::with_capacity(validators.len() * 2);

    for (i, validator) in validators.iter().enumerate() {
        transactions.push(unsigned_tx(
            TransactionType::Transfer,
            i as Nonce,
            ZERO_ADDRESS,
            *validator,
            Transaction::transfer_data(supply),
            TRANSFER_FEE,
        ));
        transactions.push(unsigned_tx(
            TransactionType::AddValidator,
            0,
            *validator,
            ZERO_ADDRESS,
            Vec::new(),
            VALIDATOR_FEE,
        ));
    }
    sort_transactions(&mut transactions);

    let mut block = Block {
        version: BLOCK_VERSION,
        timestamp: 0,
        last_hash: ZERO_HASH,
        hash: ZERO_HASH,
        validator: ZERO_ADDRESS,
        signature: EMPTY_SIGNATURE,
        transactions,
        sponsors: Vec::new(),
    };
    block.hash = compute_block_hash(&block);
    block
}

fn unsigned_tx(
    tx_type: TransactionType,
    nonce: Nonce,
    from: Address,
    to: Address,
    data: Vec<u8>,
    fee: Amount,
) -> Transaction {
    let mut tx = Transaction {
        version: TRANSACTION_VERSION,
        tx_type,
        nonce,
        from,
        to,
        data,
        fee,
        hash: ZERO_HASH,
        signature: EMPTY_SIGNATURE,
    };
    tx.hash = compute_tx_hash(&tx);
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::create_transfer;
    use proptest::prelude::*;
    use tessera_crypto::keys::{recover, Keypair};
    use tessera_types::constants::TOTAL_SUPPLY;

    fn validators() -> Vec<Address> {
        vec![[1u8; 20], [2u8; 20], [3u8; 20], [4u8; 20]]
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = genesis_block(&validators(), TOTAL_SUPPLY);
        let b = genesis_block(&validators(), TOTAL_SUPPLY);
        assert_eq!(a, b);
        assert_eq!(a.hash, compute_block_hash(&a));
        assert_eq!(a.last_hash, ZERO_HASH);
        assert_eq!(a.validator, ZERO_ADDRESS);
        assert_eq!(a.timestamp, 0);
    }

    #[test]
    fn test_genesis_contents() {
        let block = genesis_block(&validators(), TOTAL_SUPPLY);
        assert_eq!(block.transactions.len(), 8);
        // The zero address sorts first, so the mints lead in nonce order.
        for (i, tx) in block.transactions.iter().take(4).enumerate() {
            assert_eq!(tx.tx_type, TransactionType::Transfer);
            assert_eq!(tx.from, ZERO_ADDRESS);
            assert_eq!(tx.nonce, i as Nonce);
            assert_eq!(tx.amount(), Some(TOTAL_SUPPLY));
        }
        for tx in block.transactions.iter().skip(4) {
            assert_eq!(tx.tx_type, TransactionType::AddValidator);
            assert_eq!(tx.nonce, 0);
        }
    }

    #[test]
    fn test_genesis_depends_on_validator_set() {
        let a = genesis_block(&validators(), TOTAL_SUPPLY);
        let b = genesis_block(&validators()[..3], TOTAL_SUPPLY);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_build_block_signed_by_minter() {
        let minter = Keypair::generate();
        let sender = Keypair::generate();
        let tx = create_transfer(&sender, 1, [5u8; 20], 10).unwrap();
        let block = build_block(&minter, [7u8; 32], vec![tx], vec![[8u8; 20]], 1_000).unwrap();
        assert_eq!(block.validator, minter.address());
        assert_eq!(block.hash, compute_block_hash(&block));
        assert_eq!(
            recover(&block.hash, &block.signature).unwrap(),
            minter.address()
        );
    }

    fn sample_transactions() -> Vec<Transaction> {
        let mut txs = Vec::new();
        for from in 1u8..=3 {
            for nonce in 1..=3 {
                txs.push(unsigned_tx(
                    TransactionType::Transfer,
                    nonce,
                    [from; 20],
                    [9u8; 20],
                    Transaction::transfer_data(nonce as u64),
                    TRANSFER_FEE,
                ));
            }
        }
        txs
    }

    proptest! {
        #[test]
        fn prop_block_hash_ignores_tx_order(txs in Just(sample_transactions()).prop_shuffle()) {
            let mut block = genesis_block(&[], 0);
            block.transactions = sample_transactions();
            let reference = compute_block_hash(&block);
            block.transactions = txs;
            prop_assert_eq!(compute_block_hash(&block), reference);
        }
    }
}
