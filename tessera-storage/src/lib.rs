//! Storage abstraction for the Tessera ledger.
//!
//! Provides a [`LedgerStore`](traits::LedgerStore) trait with memory and
//! SQLite backends. Blocks, their transactions and known peers are persisted;
//! chain state itself is rebuilt by replaying blocks at startup.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{LedgerStore, PeerRecord};
