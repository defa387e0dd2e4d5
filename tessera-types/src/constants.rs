use crate::primitives::Amount;
use std::time::Duration;

// ─── Token Parameters ────────────────────────────────────────────────────────

/// Number of decimal places of the native token.
pub const DECIMALS: u32 = 6;

/// One full token in base units (10^6).
pub const ONE_TOKEN: Amount = 1_000_000;

/// Supply minted to each genesis validator.
pub const TOTAL_SUPPLY: Amount = 50_000_000 * ONE_TOKEN;

// ─── Transaction Parameters ──────────────────────────────────────────────────

/// Minimum fee of a Transfer transaction.
pub const TRANSFER_FEE: Amount = 100;

/// Minimum fee of an AddValidator or RemoveValidator transaction.
pub const VALIDATOR_FEE: Amount = 500;

/// Payload size of a Transfer transaction (little-endian u64 amount).
pub const TRANSFER_DATA_SIZE: usize = 8;

/// Current transaction format version.
pub const TRANSACTION_VERSION: u16 = 0;

// ─── Validator Parameters ────────────────────────────────────────────────────

/// Stake locked by an AddValidator transaction.
pub const VALIDATOR_STAKE: Amount = 10_000 * ONE_TOKEN;

/// Blocks a validator must wait after induction before it may participate.
pub const MINIMUM_VALIDATOR_AGE: u64 = 1;

/// Maximum number of registered validators.
pub const MAX_VALIDATOR_SLOTS: usize = 8;

/// Addresses seeded as validators in the default genesis block.
pub const GENESIS_VALIDATORS: [&str; 4] = [
    "0xa0736ed3C150868842c4c7F4b85Fe73eCF42AaF9",
    "0x9890b5466C04E8e7F52e35d3114aB6FFf45CaA99",
    "0xDcc9511b5D45B3B973646B7511EdcB351F9045a8",
    "0xe075ec53d0237659A2EB3190717DF87b5C935F9a",
];

// ─── Block Parameters ────────────────────────────────────────────────────────

/// Current block format version. Blocks with any other version are rejected.
pub const BLOCK_VERSION: u16 = 0;

/// Minimum number of transactions required to mint a block.
pub const TX_THRESHOLD: usize = 1;

// ─── Network Parameters ──────────────────────────────────────────────────────

/// Chain identifier.
pub const CHAIN_ID: u32 = 128;

/// Default peer-to-peer listen port.
pub const DEFAULT_P2P_PORT: u16 = 1000;

/// Default RPC port, reserved for front-ends.
pub const DEFAULT_RPC_PORT: u16 = 10001;

/// Below this many connected peers the node dials known peers.
pub const MINIMUM_PEERS: usize = 3;

/// Maximum frame payload accepted from a peer.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// ─── Sync Parameters ─────────────────────────────────────────────────────────

/// Height lag tolerated before a node considers itself out of sync.
pub const SYNC_THRESHOLD: u64 = 0;

/// Maximum number of blocks requested or served in one SyncBlock exchange.
pub const SYNC_BATCH_SIZE: u64 = 10;

// ─── Timer Intervals ─────────────────────────────────────────────────────────

/// Interval at which the node dials known peers when under-connected.
pub const CONNECT_PEERS_INTERVAL: Duration = Duration::from_secs(10);

/// Interval of the transaction pool exchange.
pub const SYNC_TX_POOL_INTERVAL: Duration = Duration::from_secs(90);

/// Interval of the chain height negotiation.
pub const SYNC_BLOCKCHAIN_INTERVAL: Duration = Duration::from_secs(30);

/// Interval of the bid/vote pool exchange.
pub const SYNC_VOTE_POOL_INTERVAL: Duration = Duration::from_secs(15);

/// Interval of the consensus round.
pub const CONSENSUS_INTERVAL: Duration = Duration::from_secs(5);

/// Interval of pool pruning.
pub const CLEAN_POOLS_INTERVAL: Duration = Duration::from_secs(60);

/// Interval of peer tip queries.
pub const PEER_INFO_INTERVAL: Duration = Duration::from_secs(45);
