/// 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// 20-byte account address: the last 20 bytes of Keccak-256 over the
/// uncompressed secp256k1 public key (without the 0x04 prefix).
pub type Address = [u8; 20];

/// 65-byte recoverable ECDSA signature laid out as `r ‖ s ‖ v`, with
/// `v = recovery_id + 27`.
pub type Signature = [u8; 65];

/// Amount of tokens in base units (6 decimals).
pub type Amount = u64;

/// Per-account transaction sequence number.
pub type Nonce = u32;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Zero-based position of a block in the chain.
pub type BlockHeight = u64;

/// Connection-local identifier of a peer.
pub type PeerId = u64;

/// Length of a serialized signature on the wire.
pub const SIGNATURE_LEN: usize = 65;

/// The all-zero hash, used as the parent of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// The all-zero address. Genesis mints originate here.
pub const ZERO_ADDRESS: Address = [0u8; 20];

/// An all-zero signature, carried by the unsigned genesis block.
pub const EMPTY_SIGNATURE: Signature = [0u8; 65];

/// Serde helper for [u8; 65] fields.
pub mod serde_sig {
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &[u8; 65], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 65], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 65 bytes for signature"))
    }
}
