use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tessera_relay::config::{RelayConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_WRITE_QUEUE_DEPTH};
use tessera_types::constants::{
    CLEAN_POOLS_INTERVAL, CONNECT_PEERS_INTERVAL, CONSENSUS_INTERVAL, DEFAULT_P2P_PORT,
    GENESIS_VALIDATORS, PEER_INFO_INTERVAL, SYNC_BLOCKCHAIN_INTERVAL, SYNC_TX_POOL_INTERVAL,
    SYNC_VOTE_POOL_INTERVAL, TOTAL_SUPPLY,
};
use tessera_types::primitives::Amount;

use crate::error::NodeError;

/// File name written by `tessera init`.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub genesis: GenesisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub listen_addr: String,
    pub boot_nodes: Vec<String>,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Storage backend: "memory" or "sqlite"
    pub db_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Hex-encoded 32-byte secret key. A fresh key is generated when unset.
    pub keypair_seed: Option<String>,
}

/// Timer periods, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub consensus_secs: u64,
    pub sync_blockchain_secs: u64,
    pub sync_transaction_pool_secs: u64,
    pub sync_voting_pool_secs: u64,
    pub clean_pools_secs: u64,
    pub peer_info_secs: u64,
    pub connect_peers_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Hex addresses seeded as validators at height 0.
    pub validators: Vec<String>,
    /// Amount minted to each genesis validator.
    pub supply: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            consensus_secs: CONSENSUS_INTERVAL.as_secs(),
            sync_blockchain_secs: SYNC_BLOCKCHAIN_INTERVAL.as_secs(),
            sync_transaction_pool_secs: SYNC_TX_POOL_INTERVAL.as_secs(),
            sync_voting_pool_secs: SYNC_VOTE_POOL_INTERVAL.as_secs(),
            clean_pools_secs: CLEAN_POOLS_INTERVAL.as_secs(),
            peer_info_secs: PEER_INFO_INTERVAL.as_secs(),
            connect_peers_secs: CONNECT_PEERS_INTERVAL.as_secs(),
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            validators: GENESIS_VALIDATORS.iter().map(|s| s.to_string()).collect(),
            supply: TOTAL_SUPPLY,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                listen_addr: format!("0.0.0.0:{DEFAULT_P2P_PORT}"),
                boot_nodes: Vec::new(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
            },
            storage: StorageConfig {
                data_dir: dirs::home_dir()
                    .map(|h| h.join(".tessera").join("data").to_string_lossy().into_owned())
                    .unwrap_or_else(|| "./tessera-data".to_string()),
                db_type: "sqlite".to_string(),
            },
            validator: ValidatorConfig::default(),
            consensus: ConsensusConfig::default(),
            genesis: GenesisConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// A zero period would spin the timer, so clamp to one second.
fn period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

impl ConsensusConfig {
    pub fn consensus(&self) -> Duration {
        period(self.consensus_secs)
    }

    pub fn sync_blockchain(&self) -> Duration {
        period(self.sync_blockchain_secs)
    }

    pub fn sync_transaction_pool(&self) -> Duration {
        period(self.sync_transaction_pool_secs)
    }

    pub fn sync_voting_pool(&self) -> Duration {
        period(self.sync_voting_pool_secs)
    }

    pub fn clean_pools(&self) -> Duration {
        period(self.clean_pools_secs)
    }

    pub fn peer_info(&self) -> Duration {
        period(self.peer_info_secs)
    }

    pub fn connect_peers(&self) -> Duration {
        period(self.connect_peers_secs)
    }
}

impl NetworkConfig {
    /// Relay settings derived from this section.
    pub fn relay_config(&self) -> Result<RelayConfig, NodeError> {
        let listen_addr: SocketAddr =
            self.listen_addr
                .parse()
                .map_err(|e| NodeError::ConfigError {
                    reason: format!("invalid listen address '{}': {}", self.listen_addr, e),
                })?;
        Ok(RelayConfig {
            listen_addr,
            boot_nodes: self.boot_nodes.clone(),
            max_connections: self.max_connections,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        })
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        Ok(config)
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }
}
