use std::collections::HashMap;
use std::sync::RwLock;

use tessera_types::block::Block;
use tessera_types::primitives::{BlockHeight, Hash};
use tessera_types::transaction::Transaction;

use crate::error::StorageError;
use crate::traits::{LedgerStore, PeerRecord};

#[derive(Default)]
struct Tables {
    blocks: Vec<Block>,
    transactions: HashMap<Hash, (BlockHeight, usize)>,
    peers: HashMap<String, PeerRecord>,
}

/// In-memory ledger store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn insert_block(&self, height: BlockHeight, block: &Block) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        let count = tables.blocks.len() as u64;
        if height < count {
            if tables.blocks[height as usize].hash == block.hash {
                return Ok(());
            }
            return Err(StorageError::HeightConflict { height });
        }
        if height > count {
            return Err(StorageError::WriteError {
                reason: format!("gap: block {height} inserted at count {count}"),
            });
        }
        for (i, tx) in block.transactions.iter().enumerate() {
            tables.transactions.insert(tx.hash, (height, i));
        }
        tables.blocks.push(block.clone());
        Ok(())
    }

    fn select_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        let tables = self.tables.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(tables.blocks.clone())
    }

    fn select_blocks(&self, start: BlockHeight, count: u64) -> Result<Vec<Block>, StorageError> {
        let tables = self.tables.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(tables
            .blocks
            .iter()
            .skip(start as usize)
            .take(count as usize)
            .cloned()
            .collect())
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        let tables = self.tables.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(tables.blocks.len() as u64)
    }

    fn select_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<(BlockHeight, Transaction)>, StorageError> {
        let tables = self.tables.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(tables.transactions.get(hash).and_then(|(height, index)| {
            tables
                .blocks
                .get(*height as usize)
                .and_then(|b| b.transactions.get(*index))
                .map(|tx| (*height, tx.clone()))
        }))
    }

    fn upsert_peer(&self, peer: &PeerRecord) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        tables.peers.insert(peer.endpoint.clone(), peer.clone());
        Ok(())
    }

    fn recent_peers(&self, limit: usize) -> Result<Vec<PeerRecord>, StorageError> {
        let tables = self.tables.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        let mut peers: Vec<PeerRecord> = tables.peers.values().cloned().collect();
        peers.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.endpoint.cmp(&b.endpoint))
        });
        peers.truncate(limit);
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_support::{make_block, make_tx};

    #[test]
    fn test_insert_and_select_blocks() {
        let store = MemoryStore::new();
        store.insert_block(0, &make_block(1, vec![])).unwrap();
        store
            .insert_block(1, &make_block(2, vec![make_tx(5)]))
            .unwrap();
        assert_eq!(store.block_count().unwrap(), 2);

        let all = store.select_all_blocks().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].hash, [2u8; 32]);

        let range = store.select_blocks(1, 10).unwrap();
        assert_eq!(range.len(), 1);
        assert!(store.select_blocks(5, 10).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_index() {
        let store = MemoryStore::new();
        store
            .insert_block(0, &make_block(1, vec![make_tx(5), make_tx(6)]))
            .unwrap();
        let (height, tx) = store.select_transaction(&[6u8; 32]).unwrap().unwrap();
        assert_eq!(height, 0);
        assert_eq!(tx.nonce, 6);
        assert!(store.select_transaction(&[7u8; 32]).unwrap().is_none());
    }

    #[test]
    fn test_reinsert_same_block_is_noop() {
        let store = MemoryStore::new();
        let block = make_block(1, vec![]);
        store.insert_block(0, &block).unwrap();
        store.insert_block(0, &block).unwrap();
        assert_eq!(store.block_count().unwrap(), 1);
    }

    #[test]
    fn test_conflicting_block_rejected() {
        let store = MemoryStore::new();
        store.insert_block(0, &make_block(1, vec![])).unwrap();
        let result = store.insert_block(0, &make_block(2, vec![]));
        assert!(matches!(
            result,
            Err(StorageError::HeightConflict { height: 0 })
        ));
    }

    #[test]
    fn test_gap_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert_block(3, &make_block(1, vec![])).is_err());
    }

    #[test]
    fn test_recent_peers_ordering() {
        let store = MemoryStore::new();
        for (endpoint, seen) in [("a:1", 10), ("b:1", 30), ("c:1", 20)] {
            store
                .upsert_peer(&PeerRecord {
                    endpoint: endpoint.to_string(),
                    last_seen: seen,
                })
                .unwrap();
        }
        store
            .upsert_peer(&PeerRecord {
                endpoint: "a:1".to_string(),
                last_seen: 40,
            })
            .unwrap();
        let peers = store.recent_peers(2).unwrap();
        let endpoints: Vec<&str> = peers.iter().map(|p| p.endpoint.as_str()).collect();
        assert_eq!(endpoints, vec!["a:1", "b:1"]);
    }
}
