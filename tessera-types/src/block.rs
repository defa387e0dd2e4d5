use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::codec::WireEncode;
use crate::primitives::{Address, Hash, Signature, Timestamp};
use crate::transaction::{sort_transactions, Transaction};

/// A block of the ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Block {
    pub version: u16,
    pub timestamp: Timestamp,
    /// Hash of the parent block. Zero for genesis.
    pub last_hash: Hash,
    /// Keccak-256 over [`Block::hash_preimage`].
    pub hash: Hash,
    /// Address of the minting validator. Zero for genesis.
    pub validator: Address,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
    pub transactions: Vec<Transaction>,
    /// Validators whose votes elected the minter.
    pub sponsors: Vec<Address>,
}

impl Block {
    /// Canonical hash input:
    /// `version ‖ timestamp ‖ last_hash ‖ validator ‖ tx* ‖ sponsor*`,
    /// with transactions taken in sender/nonce order regardless of how they
    /// are stored in the block.
    pub fn hash_preimage(&self) -> Vec<u8> {
        let mut txs = self.transactions.clone();
        sort_transactions(&mut txs);

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.last_hash);
        buf.extend_from_slice(&self.validator);
        for tx in &txs {
            tx.encode_to(&mut buf);
        }
        for sponsor in &self.sponsors {
            buf.extend_from_slice(sponsor);
        }
        buf
    }

    /// Iterator over the hashes of the contained transactions.
    pub fn transaction_hashes(&self) -> impl Iterator<Item = &Hash> {
        self.transactions.iter().map(|tx| &tx.hash)
    }
}
