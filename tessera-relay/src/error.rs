use thiserror::Error;
use tessera_types::error::TesseraError;

/// Errors that can occur in the relay layer.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A general network-level error.
    #[error("network error: {reason}")]
    NetworkError { reason: String },

    /// Failed to establish or maintain a connection.
    #[error("connection error: {reason}")]
    ConnectionError { reason: String },

    /// The requested peer was not found.
    #[error("peer not found: {peer}")]
    PeerNotFound { peer: String },

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Opcode byte outside the protocol table.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// Protocol-level error.
    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    /// A payload that does not decode.
    #[error("malformed payload: {0}")]
    Malformed(#[from] TesseraError),

    /// Channel send/receive error.
    #[error("channel error: {reason}")]
    ChannelError { reason: String },

    /// Peer is running an incompatible protocol version.
    #[error("protocol version mismatch: peer sent v{peer}, we run v{ours}")]
    VersionMismatch { peer: u8, ours: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err: RelayError = TesseraError::TrailingBytes(3).into();
        assert!(err.to_string().starts_with("malformed payload"));
    }
}
