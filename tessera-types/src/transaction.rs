use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{TRANSFER_DATA_SIZE, TRANSFER_FEE, VALIDATOR_FEE};
use crate::error::TesseraError;
use crate::primitives::{Address, Amount, Hash, Nonce, Signature};

/// Kind of a ledger transaction. The discriminant is the wire byte.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum TransactionType {
    /// Move `amount` from `from` to `to`.
    Transfer = 1,
    /// Lock the validator stake and join the validator set.
    AddValidator = 2,
    /// Leave the validator set and recover the stake.
    RemoveValidator = 3,
}

/// Fee and payload schedule of a transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSchedule {
    /// Minimum fee accepted for the type.
    pub fee: Amount,
    /// Exact length of the `data` field.
    pub data_size: usize,
}

const SCHEDULE: [(TransactionType, TypeSchedule); 3] = [
    (
        TransactionType::Transfer,
        TypeSchedule {
            fee: TRANSFER_FEE,
            data_size: TRANSFER_DATA_SIZE,
        },
    ),
    (
        TransactionType::AddValidator,
        TypeSchedule {
            fee: VALIDATOR_FEE,
            data_size: 0,
        },
    ),
    (
        TransactionType::RemoveValidator,
        TypeSchedule {
            fee: VALIDATOR_FEE,
            data_size: 0,
        },
    ),
];

impl TransactionType {
    /// Fee and data-size schedule for this type.
    pub fn schedule(self) -> TypeSchedule {
        SCHEDULE[self as usize - 1].1
    }

    /// Minimum fee for this type.
    pub fn fee(self) -> Amount {
        self.schedule().fee
    }

    /// Required `data` length for this type.
    pub fn data_size(self) -> usize {
        self.schedule().data_size
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TransactionType {
    type Error = TesseraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SCHEDULE
            .iter()
            .map(|(ty, _)| *ty)
            .find(|ty| ty.as_u8() == value)
            .ok_or(TesseraError::UnknownTransactionType(value))
    }
}

/// A signed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u16,
    pub tx_type: TransactionType,
    pub nonce: Nonce,
    pub from: Address,
    pub to: Address,
    /// Type-specific payload: a little-endian u64 amount for Transfer, empty otherwise.
    pub data: Vec<u8>,
    pub fee: Amount,
    /// Keccak-256 over [`Transaction::signing_bytes`].
    pub hash: Hash,
    #[serde(with = "crate::primitives::serde_sig")]
    pub signature: Signature,
}

impl Transaction {
    /// Canonical pre-signature encoding:
    /// `version ‖ type ‖ nonce ‖ from ‖ to ‖ data ‖ fee`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + 1 + 4 + 20 + 20 + self.data.len() + 8);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.push(self.tx_type.as_u8());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.from);
        buf.extend_from_slice(&self.to);
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(&self.fee.to_le_bytes());
        buf
    }

    /// Transferred amount, if this is a well-formed Transfer.
    pub fn amount(&self) -> Option<Amount> {
        if self.tx_type != TransactionType::Transfer {
            return None;
        }
        let bytes: [u8; 8] = self.data.as_slice().try_into().ok()?;
        Some(Amount::from_le_bytes(bytes))
    }

    /// Total debit of the sender once committed, or `None` on overflow.
    pub fn total_cost(&self) -> Option<Amount> {
        self.amount().unwrap_or(0).checked_add(self.fee)
    }

    /// Encode an amount as Transfer payload.
    pub fn transfer_data(amount: Amount) -> Vec<u8> {
        amount.to_le_bytes().to_vec()
    }
}

/// Canonical in-block ordering: by sender address (byte order), then by nonce.
pub fn sort_transactions(txs: &mut [Transaction]) {
    txs.sort_by(|a, b| a.from.cmp(&b.from).then(a.nonce.cmp(&b.nonce)));
}
