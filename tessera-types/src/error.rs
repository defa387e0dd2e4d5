use thiserror::Error;

/// Errors shared by the Tessera type, codec and key layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TesseraError {
    // ─── Codec Errors ────────────────────────────────────────────────────────
    #[error("unexpected end of input: need {needed} bytes at offset {offset}, {remaining} left")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(u8),

    #[error("invalid signature length: expected 65, got {0}")]
    InvalidSignatureLength(u8),

    #[error("invalid element count: {count}")]
    InvalidCount { count: i32 },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    // ─── Crypto Errors ───────────────────────────────────────────────────────
    #[error("invalid key material")]
    InvalidKeyMaterial,

    #[error("signing failed: {reason}")]
    SigningFailed { reason: String },

    #[error("signature recovery failed: {reason}")]
    RecoveryFailed { reason: String },

    // ─── Address Errors ──────────────────────────────────────────────────────
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },
}
