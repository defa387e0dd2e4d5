use tessera_chain::{ChainEngine, StateGuard};
use tessera_crypto::keys::Keypair;
use tessera_relay::discovery::Discovery;
use tessera_relay::{Network, RelayEvent, RelayNode};
use tessera_storage::memory::MemoryStore;
use tessera_storage::sqlite::SqliteStore;
use tessera_storage::traits::LedgerStore;
use tessera_types::primitives::Timestamp;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::genesis::genesis_validators;
use crate::{handlers, timers};

/// The main node that ties together chain state and the peer transport.
pub struct Node {
    config: NodeConfig,
    guard: StateGuard,
    relay: RelayNode,
    events: mpsc::Receiver<RelayEvent>,
    discovery: Discovery,
}

/// Create a storage backend from the node configuration.
fn create_store(config: &NodeConfig) -> Result<Box<dyn LedgerStore>, NodeError> {
    match config.storage.db_type.as_str() {
        "memory" => Ok(Box::new(MemoryStore::new())),
        "sqlite" => {
            let data_dir = std::path::Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let db_path = data_dir.join("tessera.db");
            let store = SqliteStore::new(&db_path.to_string_lossy())?;
            Ok(Box::new(store))
        }
        other => Err(NodeError::ConfigError {
            reason: format!(
                "unknown storage backend '{}', expected 'memory' or 'sqlite'",
                other
            ),
        }),
    }
}

/// Load the validator key from its hex seed, or generate a throwaway one.
pub fn load_keypair(seed_hex: Option<&str>) -> Result<Keypair, NodeError> {
    let Some(seed_hex) = seed_hex else {
        tracing::warn!("no validator key configured, using an ephemeral key");
        return Ok(Keypair::generate());
    };
    let seed_bytes = hex::decode(seed_hex.trim_start_matches("0x")).map_err(|e| {
        NodeError::ConfigError {
            reason: format!("invalid keypair seed hex: {}", e),
        }
    })?;
    let seed: [u8; 32] = seed_bytes
        .try_into()
        .map_err(|b: Vec<u8>| NodeError::ConfigError {
            reason: format!("keypair seed must be 32 bytes, got {}", b.len()),
        })?;
    Ok(Keypair::from_seed(&seed)?)
}

/// Current UNIX time in seconds.
pub fn current_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Node {
    /// Open the chain and bind the relay.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let keypair = load_keypair(config.validator.keypair_seed.as_deref())?;
        let address = keypair.address();

        let validators = genesis_validators(&config.genesis)?;
        let store = create_store(&config)?;
        let engine = ChainEngine::open(Box::new(keypair), store, &validators, config.genesis.supply)?;
        let (height, _) = engine.head();
        let guard = StateGuard::new(engine);

        let relay_config = config.network.relay_config()?;
        let discovery = Discovery::new(&relay_config.boot_nodes);
        let (relay, events) = RelayNode::bind(relay_config).await?;

        tracing::info!(
            address = %hex::encode(address),
            listen = %relay.local_addr(),
            height,
            storage = %config.storage.db_type,
            "node initialized"
        );

        Ok(Self {
            config,
            guard,
            relay,
            events,
            discovery,
        })
    }

    pub fn guard(&self) -> &StateGuard {
        &self.guard
    }

    pub fn relay(&self) -> &RelayNode {
        &self.relay
    }

    async fn connect_peers(&self) {
        let relay = &self.relay;
        timers::connect_peers(&self.guard, relay, &self.discovery, |endpoint| {
            relay.is_dialed(endpoint) || *endpoint == relay.local_addr()
        })
        .await;
    }

    /// Run the main node event loop until Ctrl+C.
    pub async fn run(mut self) -> Result<(), NodeError> {
        self.connect_peers().await;
        timers::sync_blockchain(&self.guard, &self.relay).await;

        let periods = self.config.consensus.clone();
        let start = Instant::now();
        let mut consensus = interval_at(start + periods.consensus(), periods.consensus());
        let mut sync_blockchain = interval_at(start + periods.sync_blockchain(), periods.sync_blockchain());
        let mut sync_tx_pool = interval_at(start + periods.sync_transaction_pool(), periods.sync_transaction_pool());
        let mut sync_voting_pool = interval_at(start + periods.sync_voting_pool(), periods.sync_voting_pool());
        let mut clean_pools = interval_at(start + periods.clean_pools(), periods.clean_pools());
        let mut peer_info = interval_at(start + periods.peer_info(), periods.peer_info());
        let mut connect_peers = interval_at(start + periods.connect_peers(), periods.connect_peers());
        for timer in [
            &mut consensus,
            &mut sync_blockchain,
            &mut sync_tx_pool,
            &mut sync_voting_pool,
            &mut clean_pools,
            &mut peer_info,
            &mut connect_peers,
        ] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        tracing::info!("Node is running. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::error!("relay event channel closed");
                        return Ok(());
                    };
                    handlers::handle_event(&self.guard, &self.relay, event, current_timestamp()).await;
                }
                _ = consensus.tick() => {
                    timers::consensus(&self.guard, &self.relay, current_timestamp()).await;
                }
                _ = sync_blockchain.tick() => {
                    timers::sync_blockchain(&self.guard, &self.relay).await;
                }
                _ = sync_tx_pool.tick() => {
                    timers::sync_transaction_pool(&self.guard, &self.relay).await;
                }
                _ = sync_voting_pool.tick() => {
                    timers::sync_voting_pool(&self.guard, &self.relay).await;
                }
                _ = clean_pools.tick() => {
                    timers::clean_pools(&self.guard).await;
                }
                _ = peer_info.tick() => {
                    timers::peer_info(&self.relay);
                }
                _ = connect_peers.tick() => {
                    self.connect_peers().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal");
                    self.shutdown();
                    return Ok(());
                }
            }
        }
    }

    /// Disconnect every peer.
    pub fn shutdown(&self) {
        tracing::info!(peers = self.relay.peer_count(), "Shutting down node...");
        self.relay.disconnect_all("shutting down");
        tracing::info!("Node shutdown complete");
    }
}
