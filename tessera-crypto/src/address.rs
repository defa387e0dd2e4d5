use k256::ecdsa::VerifyingKey;
use tessera_types::error::TesseraError;
use tessera_types::primitives::Address;

use crate::hash::keccak256;

/// Derive an address from a public key.
/// Address = Keccak-256(uncompressed pubkey without the 0x04 tag)[12..32]
pub fn pubkey_to_address(pubkey: &VerifyingKey) -> Address {
    let point = pubkey.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Format an address as `0x`-prefixed lowercase hex.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parse a hex address, with or without the `0x` prefix, in any letter case.
pub fn parse_address(s: &str) -> Result<Address, TesseraError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| TesseraError::InvalidAddress {
        reason: e.to_string(),
    })?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| TesseraError::InvalidAddress {
            reason: format!("expected 20 bytes, got {}", b.len()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::constants::GENESIS_VALIDATORS;

    #[test]
    fn test_parse_checksummed_address() {
        let addr = parse_address("0xa0736ed3C150868842c4c7F4b85Fe73eCF42AaF9").unwrap();
        assert_eq!(addr[0], 0xa0);
        assert_eq!(addr[19], 0xf9);
        assert_eq!(
            format_address(&addr),
            "0xa0736ed3c150868842c4c7f4b85fe73ecf42aaf9"
        );
    }

    #[test]
    fn test_parse_without_prefix() {
        let a = parse_address("9890b5466C04E8e7F52e35d3114aB6FFf45CaA99").unwrap();
        let b = parse_address("0x9890b5466c04e8e7f52e35d3114ab6fff45caa99").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzz736ed3C150868842c4c7F4b85Fe73eCF42AaF9").is_err());
    }

    #[test]
    fn test_genesis_validators_parse() {
        for s in GENESIS_VALIDATORS {
            assert!(parse_address(s).is_ok(), "{s}");
        }
    }
}
