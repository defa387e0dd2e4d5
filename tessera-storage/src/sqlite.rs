use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tessera_types::block::Block;
use tessera_types::primitives::{BlockHeight, Hash};
use tessera_types::transaction::Transaction;

use crate::error::StorageError;
use crate::traits::{decode_value, encode_value, LedgerStore, PeerRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS blocks (
    height INTEGER PRIMARY KEY,
    hash   BLOB NOT NULL UNIQUE,
    body   BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions (
    hash   BLOB PRIMARY KEY,
    height INTEGER NOT NULL REFERENCES blocks(height),
    body   BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS peers (
    endpoint  TEXT PRIMARY KEY,
    last_seen INTEGER NOT NULL
);
";

/// SQLite-backed ledger store with `blocks`, `transactions` and `peers` tables.
/// Block and transaction bodies are stored borsh-encoded.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    /// Use `:memory:` for an in-memory database (useful for tests).
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn insert_block(&self, height: BlockHeight, block: &Block) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;

        let existing: Option<Vec<u8>> = conn
            .prepare_cached("SELECT hash FROM blocks WHERE height = ?1")?
            .query_row(params![height as i64], |row| row.get(0))
            .optional()?;
        if let Some(hash) = existing {
            if hash.as_slice() == block.hash.as_slice() {
                return Ok(());
            }
            return Err(StorageError::HeightConflict { height });
        }

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        if height != count as u64 {
            return Err(StorageError::WriteError {
                reason: format!("gap: block {height} inserted at count {count}"),
            });
        }

        let body = encode_value(block)?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO blocks (height, hash, body) VALUES (?1, ?2, ?3)",
            params![height as i64, block.hash.as_slice(), body],
        )?;
        for t in &block.transactions {
            tx.execute(
                "INSERT OR REPLACE INTO transactions (hash, height, body) VALUES (?1, ?2, ?3)",
                params![t.hash.as_slice(), height as i64, encode_value(t)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn select_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        self.select_blocks(0, i64::MAX as u64)
    }

    fn select_blocks(&self, start: BlockHeight, count: u64) -> Result<Vec<Block>, StorageError> {
        let conn = self.conn.lock().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        let mut stmt = conn.prepare_cached(
            "SELECT body FROM blocks WHERE height >= ?1 ORDER BY height LIMIT ?2",
        )?;
        let limit = count.min(i64::MAX as u64) as i64;
        let mut rows = stmt.query(params![start as i64, limit])?;
        let mut blocks = Vec::new();
        while let Some(row) = rows.next()? {
            let body: Vec<u8> = row.get(0)?;
            blocks.push(decode_value(&body)?);
        }
        Ok(blocks)
    }

    fn block_count(&self) -> Result<u64, StorageError> {
        let conn = self.conn.lock().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn select_transaction(
        &self,
        hash: &Hash,
    ) -> Result<Option<(BlockHeight, Transaction)>, StorageError> {
        let conn = self.conn.lock().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        let row: Option<(i64, Vec<u8>)> = conn
            .prepare_cached("SELECT height, body FROM transactions WHERE hash = ?1")?
            .query_row(params![hash.as_slice()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        match row {
            Some((height, body)) => Ok(Some((height as u64, decode_value(&body)?))),
            None => Ok(None),
        }
    }

    fn upsert_peer(&self, peer: &PeerRecord) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO peers (endpoint, last_seen) VALUES (?1, ?2)
             ON CONFLICT(endpoint) DO UPDATE SET last_seen = excluded.last_seen",
            params![peer.endpoint, peer.last_seen as i64],
        )?;
        Ok(())
    }

    fn recent_peers(&self, limit: usize) -> Result<Vec<PeerRecord>, StorageError> {
        let conn = self.conn.lock().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        let mut stmt = conn.prepare_cached(
            "SELECT endpoint, last_seen FROM peers ORDER BY last_seen DESC, endpoint LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut peers = Vec::new();
        while let Some(row) = rows.next()? {
            let last_seen: i64 = row.get(1)?;
            peers.push(PeerRecord {
                endpoint: row.get(0)?,
                last_seen: last_seen as u64,
            });
        }
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_support::{make_block, make_tx};

    fn make_store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    #[test]
    fn test_insert_and_select_blocks() {
        let store = make_store();
        store.insert_block(0, &make_block(1, vec![])).unwrap();
        store
            .insert_block(1, &make_block(2, vec![make_tx(5)]))
            .unwrap();
        store.insert_block(2, &make_block(3, vec![])).unwrap();
        assert_eq!(store.block_count().unwrap(), 3);

        let all = store.select_all_blocks().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1], make_block(2, vec![make_tx(5)]));

        let range = store.select_blocks(1, 1).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].hash, [2u8; 32]);
    }

    #[test]
    fn test_transaction_lookup() {
        let store = make_store();
        store
            .insert_block(0, &make_block(1, vec![make_tx(8)]))
            .unwrap();
        let (height, tx) = store.select_transaction(&[8u8; 32]).unwrap().unwrap();
        assert_eq!(height, 0);
        assert_eq!(tx, make_tx(8));
        assert!(store.select_transaction(&[9u8; 32]).unwrap().is_none());
    }

    #[test]
    fn test_conflict_and_gap() {
        let store = make_store();
        let block = make_block(1, vec![]);
        store.insert_block(0, &block).unwrap();
        store.insert_block(0, &block).unwrap();
        assert!(matches!(
            store.insert_block(0, &make_block(2, vec![])),
            Err(StorageError::HeightConflict { height: 0 })
        ));
        assert!(store.insert_block(4, &make_block(4, vec![])).is_err());
    }

    #[test]
    fn test_peers_upsert() {
        let store = make_store();
        store
            .upsert_peer(&PeerRecord {
                endpoint: "10.0.0.1:1000".to_string(),
                last_seen: 5,
            })
            .unwrap();
        store
            .upsert_peer(&PeerRecord {
                endpoint: "10.0.0.2:1000".to_string(),
                last_seen: 7,
            })
            .unwrap();
        store
            .upsert_peer(&PeerRecord {
                endpoint: "10.0.0.1:1000".to_string(),
                last_seen: 9,
            })
            .unwrap();
        let peers = store.recent_peers(10).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].endpoint, "10.0.0.1:1000");
        assert_eq!(peers[0].last_seen, 9);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStore::new(path).unwrap();
            store
                .insert_block(0, &make_block(1, vec![make_tx(3)]))
                .unwrap();
        }
        let store = SqliteStore::new(path).unwrap();
        assert_eq!(store.block_count().unwrap(), 1);
        assert!(store.select_transaction(&[3u8; 32]).unwrap().is_some());
    }
}
