use crate::error::RelayError;

/// Wire protocol version carried in every frame header. Bump on any breaking
/// change to a payload layout.
pub const PROTOCOL_VERSION: u8 = 1;

/// `version u8 ‖ opcode u8 ‖ flags u8 ‖ payload length u32 LE`.
pub const HEADER_LEN: usize = 7;

/// Flag bit set on requests; clear on responses.
pub const FLAG_REQUEST: u8 = 0x01;

/// Message kinds on the wire. The discriminant is the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Bid = 11,
    PeerInfo = 12,
    ShareBlock = 13,
    ShareTransaction = 14,
    SyncBlock = 15,
    SyncBlockchain = 16,
    SyncTransactionPool = 17,
    SyncVotingPool = 18,
    Vote = 19,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::Bid,
        Opcode::PeerInfo,
        Opcode::ShareBlock,
        Opcode::ShareTransaction,
        Opcode::SyncBlock,
        Opcode::SyncBlockchain,
        Opcode::SyncTransactionPool,
        Opcode::SyncVotingPool,
        Opcode::Vote,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = RelayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.as_u8() == value)
            .ok_or(RelayError::UnknownOpcode(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes() {
        assert_eq!(Opcode::Bid.as_u8(), 11);
        assert_eq!(Opcode::Vote.as_u8(), 19);
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op.as_u8()).unwrap(), op);
        }
        assert!(matches!(
            Opcode::try_from(20),
            Err(RelayError::UnknownOpcode(20))
        ));
        assert!(Opcode::try_from(10).is_err());
    }
}
