//! Typed payloads for every opcode.

use tessera_types::block::Block;
use tessera_types::codec::{
    put_count, WireDecode, WireEncode, WireReader, BID_SIZE, MIN_BLOCK_SIZE,
    MIN_TRANSACTION_SIZE, VOTE_SIZE,
};
use tessera_types::consensus::{NodeBid, NodeVote, VotingPoolDelta, VotingPoolDigest};
use tessera_types::primitives::{BlockHeight, Hash};
use tessera_types::transaction::Transaction;

use crate::codec::Frame;
use crate::error::RelayError;
use crate::protocol::Opcode;

const HASH_LEN: usize = 32;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    Bid(NodeBid),
    PeerInfoRequest,
    PeerInfo { height: BlockHeight, hash: Hash },
    ShareBlock { height: BlockHeight, block: Block },
    ShareTransaction(Transaction),
    SyncBlockRequest { start: BlockHeight, count: u64 },
    SyncBlockResponse { start: BlockHeight, blocks: Vec<Block> },
    SyncBlockchainRequest,
    SyncBlockchainResponse { height: BlockHeight, hash: Hash },
    /// Hashes the requester already holds.
    SyncTransactionPoolRequest(Vec<Hash>),
    SyncTransactionPoolResponse(Vec<Transaction>),
    SyncVotingPoolRequest(VotingPoolDigest),
    SyncVotingPoolResponse(VotingPoolDelta),
    Vote(NodeVote),
}

fn put_height(out: &mut Vec<u8>, height: u64) {
    let height = i32::try_from(height).unwrap_or(i32::MAX);
    out.extend_from_slice(&height.to_le_bytes());
}

fn read_height(reader: &mut WireReader<'_>) -> Result<u64, RelayError> {
    let value = reader.read_i32()?;
    u64::try_from(value).map_err(|_| RelayError::ProtocolError {
        reason: format!("negative height {value}"),
    })
}

fn read_hashes(reader: &mut WireReader<'_>, count: usize) -> Result<Vec<Hash>, RelayError> {
    (0..count)
        .map(|_| reader.read_array::<HASH_LEN>().map_err(RelayError::from))
        .collect()
}

fn read_list<T: WireDecode>(
    reader: &mut WireReader<'_>,
    min_item_size: usize,
) -> Result<Vec<T>, RelayError> {
    let count = reader.read_count(min_item_size)?;
    (0..count)
        .map(|_| T::decode_from(reader).map_err(RelayError::from))
        .collect()
}

fn put_list<T: WireEncode>(out: &mut Vec<u8>, items: &[T]) {
    put_count(out, items.len());
    for item in items {
        item.encode_to(out);
    }
}

impl NetworkMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            NetworkMessage::Bid(_) => Opcode::Bid,
            NetworkMessage::PeerInfoRequest | NetworkMessage::PeerInfo { .. } => Opcode::PeerInfo,
            NetworkMessage::ShareBlock { .. } => Opcode::ShareBlock,
            NetworkMessage::ShareTransaction(_) => Opcode::ShareTransaction,
            NetworkMessage::SyncBlockRequest { .. } | NetworkMessage::SyncBlockResponse { .. } => {
                Opcode::SyncBlock
            }
            NetworkMessage::SyncBlockchainRequest
            | NetworkMessage::SyncBlockchainResponse { .. } => Opcode::SyncBlockchain,
            NetworkMessage::SyncTransactionPoolRequest(_)
            | NetworkMessage::SyncTransactionPoolResponse(_) => Opcode::SyncTransactionPool,
            NetworkMessage::SyncVotingPoolRequest(_) | NetworkMessage::SyncVotingPoolResponse(_) => {
                Opcode::SyncVotingPool
            }
            NetworkMessage::Vote(_) => Opcode::Vote,
        }
    }

    /// Whether the frame carries the request flag. Gossiped entities travel
    /// as requests.
    pub fn is_request(&self) -> bool {
        !matches!(
            self,
            NetworkMessage::PeerInfo { .. }
                | NetworkMessage::SyncBlockResponse { .. }
                | NetworkMessage::SyncBlockchainResponse { .. }
                | NetworkMessage::SyncTransactionPoolResponse(_)
                | NetworkMessage::SyncVotingPoolResponse(_)
        )
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            NetworkMessage::Bid(bid) => bid.encode_to(&mut out),
            NetworkMessage::Vote(vote) => vote.encode_to(&mut out),
            NetworkMessage::ShareTransaction(tx) => tx.encode_to(&mut out),
            NetworkMessage::PeerInfoRequest | NetworkMessage::SyncBlockchainRequest => {}
            NetworkMessage::PeerInfo { height, hash }
            | NetworkMessage::SyncBlockchainResponse { height, hash } => {
                put_height(&mut out, *height);
                out.extend_from_slice(hash);
            }
            NetworkMessage::ShareBlock { height, block } => {
                put_height(&mut out, *height);
                block.encode_to(&mut out);
            }
            NetworkMessage::SyncBlockRequest { start, count } => {
                put_height(&mut out, *start);
                put_height(&mut out, *count);
            }
            NetworkMessage::SyncBlockResponse { start, blocks } => {
                put_height(&mut out, *start);
                put_list(&mut out, blocks);
            }
            NetworkMessage::SyncTransactionPoolRequest(hashes) => {
                for hash in hashes {
                    out.extend_from_slice(hash);
                }
            }
            NetworkMessage::SyncTransactionPoolResponse(txs) => put_list(&mut out, txs),
            NetworkMessage::SyncVotingPoolRequest(digest) => {
                put_count(&mut out, digest.bid_hashes.len());
                for hash in &digest.bid_hashes {
                    out.extend_from_slice(hash);
                }
                put_count(&mut out, digest.buckets.len());
                for (bid, votes) in &digest.buckets {
                    out.extend_from_slice(bid);
                    put_count(&mut out, votes.len());
                    for vote in votes {
                        out.extend_from_slice(vote);
                    }
                }
            }
            NetworkMessage::SyncVotingPoolResponse(delta) => {
                put_list(&mut out, &delta.bids);
                put_count(&mut out, delta.buckets.len());
                for bucket in &delta.buckets {
                    put_list(&mut out, bucket);
                }
            }
        }
        out
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            opcode: self.opcode(),
            request: self.is_request(),
            payload: self.encode_payload(),
        }
    }

    /// Decode a frame's payload. The whole payload must be consumed.
    pub fn from_frame(frame: &Frame) -> Result<Self, RelayError> {
        let mut reader = WireReader::new(&frame.payload);
        let message = match (frame.opcode, frame.request) {
            (Opcode::Bid, _) => NetworkMessage::Bid(NodeBid::decode_from(&mut reader)?),
            (Opcode::Vote, _) => NetworkMessage::Vote(NodeVote::decode_from(&mut reader)?),
            (Opcode::ShareTransaction, _) => {
                NetworkMessage::ShareTransaction(Transaction::decode_from(&mut reader)?)
            }
            (Opcode::ShareBlock, _) => NetworkMessage::ShareBlock {
                height: read_height(&mut reader)?,
                block: Block::decode_from(&mut reader)?,
            },
            (Opcode::PeerInfo, true) => NetworkMessage::PeerInfoRequest,
            (Opcode::PeerInfo, false) => NetworkMessage::PeerInfo {
                height: read_height(&mut reader)?,
                hash: reader.read_array()?,
            },
            (Opcode::SyncBlockchain, true) => NetworkMessage::SyncBlockchainRequest,
            (Opcode::SyncBlockchain, false) => NetworkMessage::SyncBlockchainResponse {
                height: read_height(&mut reader)?,
                hash: reader.read_array()?,
            },
            (Opcode::SyncBlock, true) => NetworkMessage::SyncBlockRequest {
                start: read_height(&mut reader)?,
                count: read_height(&mut reader)?,
            },
            (Opcode::SyncBlock, false) => NetworkMessage::SyncBlockResponse {
                start: read_height(&mut reader)?,
                blocks: read_list(&mut reader, MIN_BLOCK_SIZE)?,
            },
            (Opcode::SyncTransactionPool, true) => {
                if reader.remaining() % HASH_LEN != 0 {
                    return Err(RelayError::ProtocolError {
                        reason: "hash list is not a multiple of 32 bytes".to_string(),
                    });
                }
                let count = reader.remaining() / HASH_LEN;
                NetworkMessage::SyncTransactionPoolRequest(read_hashes(&mut reader, count)?)
            }
            (Opcode::SyncTransactionPool, false) => NetworkMessage::SyncTransactionPoolResponse(
                read_list(&mut reader, MIN_TRANSACTION_SIZE)?,
            ),
            (Opcode::SyncVotingPool, true) => {
                let bid_count = reader.read_count(HASH_LEN)?;
                let bid_hashes = read_hashes(&mut reader, bid_count)?;
                let bucket_count = reader.read_count(HASH_LEN + 4)?;
                let mut buckets = Vec::with_capacity(bucket_count);
                for _ in 0..bucket_count {
                    let bid = reader.read_array::<HASH_LEN>()?;
                    let vote_count = reader.read_count(HASH_LEN)?;
                    buckets.push((bid, read_hashes(&mut reader, vote_count)?));
                }
                NetworkMessage::SyncVotingPoolRequest(VotingPoolDigest {
                    bid_hashes,
                    buckets,
                })
            }
            (Opcode::SyncVotingPool, false) => {
                let bids = read_list(&mut reader, BID_SIZE)?;
                let bucket_count = reader.read_count(4)?;
                let mut buckets = Vec::with_capacity(bucket_count);
                for _ in 0..bucket_count {
                    buckets.push(read_list(&mut reader, VOTE_SIZE)?);
                }
                NetworkMessage::SyncVotingPoolResponse(VotingPoolDelta { bids, buckets })
            }
        };
        reader.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::transaction::TransactionType;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 0,
            tx_type: TransactionType::Transfer,
            nonce: 1,
            from: [1u8; 20],
            to: [2u8; 20],
            data: Transaction::transfer_data(5),
            fee: 100,
            hash: [3u8; 32],
            signature: [4u8; 65],
        }
    }

    fn sample_vote() -> NodeVote {
        NodeVote {
            last_block_hash: [1u8; 32],
            address: [2u8; 20],
            voted_for: [3u8; 20],
            signature: [4u8; 65],
        }
    }

    fn through_frame(message: &NetworkMessage) -> NetworkMessage {
        NetworkMessage::from_frame(&message.to_frame()).unwrap()
    }

    #[test]
    fn test_peer_info_payload_layout() {
        let message = NetworkMessage::PeerInfo {
            height: 7,
            hash: [9u8; 32],
        };
        let frame = message.to_frame();
        assert!(!frame.request);
        assert_eq!(frame.payload.len(), 36);
        assert_eq!(&frame.payload[..4], &7i32.to_le_bytes());
        assert_eq!(through_frame(&message), message);

        let request = NetworkMessage::PeerInfoRequest.to_frame();
        assert!(request.request && request.payload.is_empty());
    }

    #[test]
    fn test_sync_block_messages() {
        let request = NetworkMessage::SyncBlockRequest { start: 6, count: 3 };
        assert_eq!(request.to_frame().payload.len(), 8);
        assert_eq!(through_frame(&request), request);
    }

    #[test]
    fn test_transaction_pool_request_is_bare_hashes() {
        let message = NetworkMessage::SyncTransactionPoolRequest(vec![[1u8; 32], [2u8; 32]]);
        assert_eq!(message.to_frame().payload.len(), 64);
        assert_eq!(through_frame(&message), message);

        let mut frame = message.to_frame();
        frame.payload.pop();
        assert!(NetworkMessage::from_frame(&frame).is_err());
    }

    #[test]
    fn test_voting_pool_messages() {
        let digest = NetworkMessage::SyncVotingPoolRequest(VotingPoolDigest {
            bid_hashes: vec![[1u8; 32]],
            buckets: vec![([1u8; 32], vec![[2u8; 32], [3u8; 32]]), ([4u8; 32], vec![])],
        });
        assert_eq!(through_frame(&digest), digest);

        let delta = NetworkMessage::SyncVotingPoolResponse(VotingPoolDelta {
            bids: vec![],
            buckets: vec![vec![sample_vote()]],
        });
        assert_eq!(through_frame(&delta), delta);
    }

    #[test]
    fn test_share_transaction_and_trailing_bytes() {
        let message = NetworkMessage::ShareTransaction(sample_tx());
        assert_eq!(through_frame(&message), message);

        let mut frame = message.to_frame();
        frame.payload.push(0);
        assert!(matches!(
            NetworkMessage::from_frame(&frame),
            Err(RelayError::Malformed(_))
        ));
    }

    #[test]
    fn test_negative_height_rejected() {
        let frame = Frame::request(Opcode::SyncBlock, [(-1i32).to_le_bytes(), 1i32.to_le_bytes()].concat());
        assert!(matches!(
            NetworkMessage::from_frame(&frame),
            Err(RelayError::ProtocolError { .. })
        ));
    }
}
