use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tessera_types::block::Block;
use tessera_types::primitives::{BlockHeight, Hash, Timestamp};
use tessera_types::transaction::Transaction;

use crate::error::StorageError;

/// A peer endpoint remembered across restarts.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PeerRecord {
    /// `host:port` the peer listens on.
    pub endpoint: String,
    /// Unix time the peer was last seen connected.
    pub last_seen: Timestamp,
}

/// Durable ledger storage.
///
/// Blocks are keyed by height and must be inserted contiguously. Inserting a
/// block also indexes its transactions by hash.
pub trait LedgerStore: Send + Sync {
    /// Persist a block and its transactions at `height`. Re-inserting the same
    /// block is a no-op.
    fn insert_block(&self, height: BlockHeight, block: &Block) -> Result<(), StorageError>;

    /// All stored blocks in height order.
    fn select_all_blocks(&self) -> Result<Vec<Block>, StorageError>;

    /// Up to `count` blocks starting at `start`, in height order.
    fn select_blocks(&self, start: BlockHeight, count: u64) -> Result<Vec<Block>, StorageError>;

    /// Number of stored blocks.
    fn block_count(&self) -> Result<u64, StorageError>;

    /// Height of the block containing the transaction, and the transaction.
    fn select_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<(BlockHeight, Transaction)>, StorageError>;

    /// Insert or refresh a peer record.
    fn upsert_peer(&self, peer: &PeerRecord) -> Result<(), StorageError>;

    /// Most recently seen peers first, at most `limit`.
    fn recent_peers(&self, limit: usize) -> Result<Vec<PeerRecord>, StorageError>;
}

/// Blanket implementation so a store can be shared across owners
/// (e.g. for persistence-across-restart tests).
impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn insert_block(&self, height: BlockHeight, block: &Block) -> Result<(), StorageError> {
        (**self).insert_block(height, block)
    }

    fn select_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        (**self).select_all_blocks()
    }

    fn select_blocks(&self, start: BlockHeight, count: u64) -> Result<Vec<Block>, StorageError> {
        (**self).select_blocks(start, count)
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        (**self).block_count()
    }

    fn select_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<(BlockHeight, Transaction)>, StorageError> {
        (**self).select_transaction(hash)
    }

    fn upsert_peer(&self, peer: &PeerRecord) -> Result<(), StorageError> {
        (**self).upsert_peer(peer)
    }

    fn recent_peers(&self, limit: usize) -> Result<Vec<PeerRecord>, StorageError> {
        (**self).recent_peers(limit)
    }
}

/// Blanket implementation for a type-erased store.
impl LedgerStore for Box<dyn LedgerStore> {
    fn insert_block(&self, height: BlockHeight, block: &Block) -> Result<(), StorageError> {
        (**self).insert_block(height, block)
    }

    fn select_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        (**self).select_all_blocks()
    }

    fn select_blocks(&self, start: BlockHeight, count: u64) -> Result<Vec<Block>, StorageError> {
        (**self).select_blocks(start, count)
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        (**self).block_count()
    }

    fn select_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<(BlockHeight, Transaction)>, StorageError> {
        (**self).select_transaction(hash)
    }

    fn upsert_peer(&self, peer: &PeerRecord) -> Result<(), StorageError> {
        (**self).upsert_peer(peer)
    }

    fn recent_peers(&self, limit: usize) -> Result<Vec<PeerRecord>, StorageError> {
        (**self).recent_peers(limit)
    }
}

/// Serialize a value with borsh, mapping failures to [`StorageError`].
pub(crate) fn encode_value<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    borsh::to_vec(value).map_err(|e| StorageError::SerializationError {
        reason: e.to_string(),
    })
}

/// Deserialize a borsh value, mapping failures to [`StorageError`].
pub(crate) fn decode_value<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, StorageError> {
    T::try_from_slice(bytes).map_err(|e| StorageError::DeserializationError {
        reason: e.to_string(),
    })
}
