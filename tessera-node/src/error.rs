use thiserror::Error;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("genesis error: {reason}")]
    GenesisError { reason: String },

    #[error("key error: {0}")]
    KeyError(#[from] tessera_types::error::TesseraError),

    #[error("storage error: {0}")]
    StorageError(#[from] tessera_storage::error::StorageError),

    #[error("relay error: {0}")]
    RelayError(#[from] tessera_relay::error::RelayError),

    #[error("chain error: {0}")]
    ChainError(#[from] tessera_chain::ChainError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = NodeError::ConfigError {
            reason: "missing field".to_string(),
        };
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_chain_error_from() {
        let err: NodeError = tessera_chain::ChainError::AlreadyVoted.into();
        assert!(matches!(err, NodeError::ChainError(_)));
        assert!(err.to_string().starts_with("chain error"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let node_err: NodeError = io_err.into();
        assert!(matches!(node_err, NodeError::IoError(_)));
    }
}
