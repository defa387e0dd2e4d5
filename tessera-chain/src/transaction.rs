use tessera_crypto::hash::keccak256;
use tessera_crypto::signer::Signer;
use tessera_types::constants::TRANSACTION_VERSION;
use tessera_types::primitives::{Address, Hash, Nonce, ZERO_ADDRESS};
use tessera_types::transaction::{Transaction, TransactionType};

use crate::error::ChainError;

/// Keccak-256 over the canonical pre-signature encoding.
pub fn compute_tx_hash(tx: &Transaction) -> Hash {
    keccak256(&tx.signing_bytes())
}

/// Build, hash and sign a transaction from the signer's address.
///
/// The fee is the schedule minimum for the type.
pub fn create_transaction(
    signer: &dyn Signer,
    tx_type: TransactionType,
    nonce: Nonce,
    to: Address,
    data: Vec<u8>,
) -> Result<Transaction, ChainError> {
    let mut tx = Transaction {
        version: TRANSACTION_VERSION,
        tx_type,
        nonce,
        from: signer.address(),
        to,
        data,
        fee: tx_type.fee(),
        hash: [0u8; 32],
        signature: [0u8; 65],
    };
    tx.hash = compute_tx_hash(&tx);
    tx.signature = signer.sign(&tx.hash)?;
    Ok(tx)
}

/// Transfer `amount` to `to`.
pub fn create_transfer(
    signer: &dyn Signer,
    nonce: Nonce,
    to: Address,
    amount: u64,
) -> Result<Transaction, ChainError> {
    create_transaction(
        signer,
        TransactionType::Transfer,
        nonce,
        to,
        Transaction::transfer_data(amount),
    )
}

/// Stake and join the validator set.
pub fn create_add_validator(signer: &dyn Signer, nonce: Nonce) -> Result<Transaction, ChainError> {
    create_transaction(
        signer,
        TransactionType::AddValidator,
        nonce,
        ZERO_ADDRESS,
        Vec::new(),
    )
}

/// Leave the validator set and recover the stake.
pub fn create_remove_validator(
    signer: &dyn Signer,
    nonce: Nonce,
) -> Result<Transaction, ChainError> {
    create_transaction(
        signer,
        TransactionType::RemoveValidator,
        nonce,
        ZERO_ADDRESS,
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_crypto::keys::{recover, Keypair};

    #[test]
    fn test_create_transfer_is_signed() {
        let kp = Keypair::generate();
        let tx = create_transfer(&kp, 1, [9u8; 20], 1_000).unwrap();
        assert_eq!(tx.from, kp.address());
        assert_eq!(tx.fee, 100);
        assert_eq!(tx.amount(), Some(1_000));
        assert_eq!(tx.hash, compute_tx_hash(&tx));
        assert_eq!(recover(&tx.hash, &tx.signature).unwrap(), kp.address());
    }

    #[test]
    fn test_validator_transactions_have_empty_data() {
        let kp = Keypair::generate();
        let add = create_add_validator(&kp, 1).unwrap();
        let remove = create_remove_validator(&kp, 2).unwrap();
        assert!(add.data.is_empty());
        assert_eq!(add.fee, 500);
        assert_eq!(remove.tx_type, TransactionType::RemoveValidator);
        assert_ne!(add.hash, remove.hash);
    }

    #[test]
    fn test_hash_covers_fee() {
        let kp = Keypair::generate();
        let tx = create_transfer(&kp, 1, [9u8; 20], 1_000).unwrap();
        let mut bumped = tx.clone();
        bumped.fee += 1;
        assert_ne!(compute_tx_hash(&bumped), tx.hash);
    }
}
