//! Chain state machine for the Tessera ledger.
//!
//! Holds the replicated ledger, the transaction/block/bid/vote pools,
//! validation, the weighted bid/vote consensus round and height negotiation.
//! All of it is owned by one [`ChainEngine`](engine::ChainEngine) that callers
//! reach through a [`StateGuard`](guard::StateGuard).

pub mod block;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod mempool;
pub mod sync;
pub mod transaction;
pub mod validation;

pub use engine::{BlockOutcome, ChainEngine, Outbound, SyncAction};
pub use error::{ChainError, ConsensusError};
pub use guard::StateGuard;
