pub mod block;
pub mod codec;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod primitives;
pub mod transaction;

#[cfg(test)]
mod tests {
    use borsh::{BorshDeserialize, BorshSerialize};

    /// Helper: borsh round-trip test.
    fn borsh_roundtrip<T: BorshSerialize + BorshDeserialize + PartialEq + std::fmt::Debug>(
        value: &T,
    ) {
        let encoded = borsh::to_vec(value).expect("borsh serialize failed");
        let decoded = T::try_from_slice(&encoded).expect("borsh deserialize failed");
        assert_eq!(*value, decoded);
    }

    #[test]
    fn test_block_borsh_roundtrip() {
        use crate::block::Block;
        use crate::transaction::{Transaction, TransactionType};
        let block = Block {
            version: 0,
            timestamp: 42,
            last_hash: [1u8; 32],
            hash: [2u8; 32],
            validator: [3u8; 20],
            signature: [4u8; 65],
            transactions: vec![Transaction {
                version: 0,
                tx_type: TransactionType::RemoveValidator,
                nonce: 9,
                from: [5u8; 20],
                to: [0u8; 20],
                data: vec![],
                fee: 500,
                hash: [6u8; 32],
                signature: [7u8; 65],
            }],
            sponsors: vec![[8u8; 20]],
        };
        borsh_roundtrip(&block);
    }

    #[test]
    fn test_transaction_type_borsh_uses_wire_byte() {
        use crate::transaction::TransactionType;
        let encoded = borsh::to_vec(&TransactionType::AddValidator).unwrap();
        assert_eq!(encoded, vec![2]);
    }

    #[test]
    fn test_block_serde_json() {
        use crate::consensus::NodeBid;
        let bid = NodeBid {
            last_block_hash: [1u8; 32],
            address: [2u8; 20],
            signature: [3u8; 65],
        };
        let json = serde_json::to_string(&bid).unwrap();
        let back: NodeBid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bid);
    }
}
