use serde::Serialize;

use tessera_chain::block::genesis_block;
use tessera_crypto::address::{format_address, parse_address};
use tessera_types::block::Block;
use tessera_types::primitives::{Address, Amount};

use crate::config::GenesisConfig;
use crate::error::NodeError;

/// What `tessera genesis` prints.
#[derive(Debug, Serialize)]
pub struct GenesisOutput {
    pub hash: String,
    pub validators: Vec<String>,
    pub supply_per_validator: Amount,
    pub block: Block,
}

/// Parse the configured genesis validator addresses.
pub fn genesis_validators(config: &GenesisConfig) -> Result<Vec<Address>, NodeError> {
    if config.validators.is_empty() {
        return Err(NodeError::GenesisError {
            reason: "at least one genesis validator is required".to_string(),
        });
    }
    config
        .validators
        .iter()
        .map(|s| {
            parse_address(s).map_err(|e| NodeError::GenesisError {
                reason: format!("invalid validator address '{}': {}", s, e),
            })
        })
        .collect()
}

/// Build the deterministic genesis block for `config`.
pub fn create_genesis(config: &GenesisConfig) -> Result<GenesisOutput, NodeError> {
    let validators = genesis_validators(config)?;
    let block = genesis_block(&validators, config.supply);
    Ok(GenesisOutput {
        hash: hex::encode(block.hash),
        validators: validators.iter().map(format_address).collect(),
        supply_per_validator: config.supply,
        block,
    })
}

/// Render the genesis block as pretty JSON, writing it to `output` if given.
pub fn generate_genesis(config: &GenesisConfig, output: Option<&str>) -> Result<String, NodeError> {
    let genesis = create_genesis(config)?;
    let json = serde_json::to_string_pretty(&genesis).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to serialize genesis: {}", e),
    })?;
    if let Some(path) = output {
        std::fs::write(path, &json)?;
    }
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_genesis_is_deterministic() {
        let config = GenesisConfig::default();
        let a = create_genesis(&config).unwrap();
        let b = create_genesis(&config).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.validators.len(), 4);
        // A transfer and an AddValidator per validator.
        assert_eq!(a.block.transactions.len(), 8);
    }

    #[test]
    fn test_validator_set_changes_hash() {
        let config = GenesisConfig::default();
        let mut fewer = config.clone();
        fewer.validators.truncate(2);
        assert_ne!(
            create_genesis(&config).unwrap().hash,
            create_genesis(&fewer).unwrap().hash
        );
    }

    #[test]
    fn test_rejects_bad_config() {
        let empty = GenesisConfig {
            validators: vec![],
            supply: 1,
        };
        assert!(matches!(
            genesis_validators(&empty),
            Err(NodeError::GenesisError { .. })
        ));

        let garbage = GenesisConfig {
            validators: vec!["0x1234".to_string()],
            supply: 1,
        };
        assert!(genesis_validators(&garbage).is_err());
    }

    #[test]
    fn test_generate_writes_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("genesis.json");
        let json =
            generate_genesis(&GenesisConfig::default(), Some(path.to_str().unwrap())).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(json, written);
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["validators"].as_array().unwrap().len(), 4);
        assert!(value["block"]["transactions"].is_array());
    }
}
