//! Bit-exact little-endian wire encoding for ledger entities.
//!
//! Layouts:
//! - Transaction: `version u16 ‖ type u8 ‖ nonce u32 ‖ from 20 ‖ to 20 ‖ data ‖
//!   fee u64 ‖ hash 32 ‖ sigLen u8 ‖ signature`
//! - Block: `version u16 ‖ timestamp u64 ‖ last_hash 32 ‖ hash 32 ‖ validator 20 ‖
//!   sigLen u8 ‖ signature ‖ txCount i32 ‖ tx* ‖ sponsorCount i32 ‖ sponsor*`
//! - NodeBid: `last_block_hash 32 ‖ address 20 ‖ sigLen u8 ‖ signature`
//! - NodeVote: `last_block_hash 32 ‖ voted_for 20 ‖ address 20 ‖ sigLen u8 ‖ signature`
//!
//! The length of a transaction's `data` is implied by its type.

use crate::block::Block;
use crate::consensus::{NodeBid, NodeVote};
use crate::error::TesseraError;
use crate::primitives::{Signature, SIGNATURE_LEN};
use crate::transaction::{Transaction, TransactionType};

/// Smallest possible encoded transaction (empty `data`).
pub const MIN_TRANSACTION_SIZE: usize = 2 + 1 + 4 + 20 + 20 + 8 + 32 + 1 + SIGNATURE_LEN;

/// Smallest possible encoded block (no transactions, no sponsors).
pub const MIN_BLOCK_SIZE: usize = 2 + 8 + 32 + 32 + 20 + 1 + SIGNATURE_LEN + 4 + 4;

/// Encoded size of a bid.
pub const BID_SIZE: usize = 32 + 20 + 1 + SIGNATURE_LEN;

/// Encoded size of a vote.
pub const VOTE_SIZE: usize = 32 + 20 + 20 + 1 + SIGNATURE_LEN;

/// Types with a canonical wire encoding.
pub trait WireEncode {
    /// Append the encoding of `self` to `out`.
    fn encode_to(&self, out: &mut Vec<u8>);

    /// Encode `self` into a fresh buffer.
    fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }
}

/// Types decodable from their canonical wire encoding.
pub trait WireDecode: Sized {
    /// Decode one value from the reader, advancing it.
    fn decode_from(reader: &mut WireReader<'_>) -> Result<Self, TesseraError>;

    /// Decode a value that must span the whole input.
    fn from_wire(bytes: &[u8]) -> Result<Self, TesseraError> {
        let mut reader = WireReader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Cursor over a received byte slice. Every read is bounds-checked.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail if any bytes were left unconsumed.
    pub fn finish(&self) -> Result<(), TesseraError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(TesseraError::TrailingBytes(n)),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], TesseraError> {
        if self.remaining() < len {
            return Err(TesseraError::UnexpectedEof {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TesseraError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, TesseraError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TesseraError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, TesseraError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, TesseraError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, TesseraError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read an i32 element count, rejecting negative values and counts that
    /// cannot fit in the remaining input at `min_item_size` bytes each.
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize, TesseraError> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(TesseraError::InvalidCount { count });
        }
        let n = count as usize;
        if n.saturating_mul(min_item_size.max(1)) > self.remaining() {
            return Err(TesseraError::InvalidCount { count });
        }
        Ok(n)
    }

    /// Read a `sigLen u8 ‖ signature` pair.
    pub fn read_signature(&mut self) -> Result<Signature, TesseraError> {
        let len = self.read_u8()?;
        if len as usize != SIGNATURE_LEN {
            return Err(TesseraError::InvalidSignatureLength(len));
        }
        self.read_array()
    }
}

/// Append an element count as i32 little-endian.
pub fn put_count(out: &mut Vec<u8>, count: usize) {
    out.extend_from_slice(&(count as i32).to_le_bytes());
}

fn put_signature(out: &mut Vec<u8>, signature: &Signature) {
    out.push(SIGNATURE_LEN as u8);
    out.extend_from_slice(signature);
}

impl WireEncode for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.signing_bytes());
        out.extend_from_slice(&self.hash);
        put_signature(out, &self.signature);
    }
}

impl WireDecode for Transaction {
    fn decode_from(reader: &mut WireReader<'_>) -> Result<Self, TesseraError> {
        let version = reader.read_u16()?;
        let tx_type = TransactionType::try_from(reader.read_u8()?)?;
        let nonce = reader.read_u32()?;
        let from = reader.read_array()?;
        let to = reader.read_array()?;
        let data = reader.read_bytes(tx_type.data_size())?.to_vec();
        let fee = reader.read_u64()?;
        let hash = reader.read_array()?;
        let signature = reader.read_signature()?;
        Ok(Transaction {
            version,
            tx_type,
            nonce,
            from,
            to,
            data,
            fee,
            hash,
            signature,
        })
    }
}

impl WireEncode for Block {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.last_hash);
        out.extend_from_slice(&self.hash);
        out.extend_from_slice(&self.validator);
        put_signature(out, &self.signature);
        put_count(out, self.transactions.len());
        for tx in &self.transactions {
            tx.encode_to(out);
        }
        put_count(out, self.sponsors.len());
        for sponsor in &self.sponsors {
            out.extend_from_slice(sponsor);
        }
    }
}

impl WireDecode for Block {
    fn decode_from(reader: &mut WireReader<'_>) -> Result<Self, TesseraError> {
        let version = reader.read_u16()?;
        let timestamp = reader.read_u64()?;
        let last_hash = reader.read_array()?;
        let hash = reader.read_array()?;
        let validator = reader.read_array()?;
        let signature = reader.read_signature()?;

        let tx_count = reader.read_count(MIN_TRANSACTION_SIZE)?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::decode_from(reader)?);
        }

        let sponsor_count = reader.read_count(20)?;
        let mut sponsors = Vec::with_capacity(sponsor_count);
        for _ in 0..sponsor_count {
            sponsors.push(reader.read_array()?);
        }

        Ok(Block {
            version,
            timestamp,
            last_hash,
            hash,
            validator,
            signature,
            transactions,
            sponsors,
        })
    }
}

impl WireEncode for NodeBid {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.last_block_hash);
        out.extend_from_slice(&self.address);
        put_signature(out, &self.signature);
    }
}

impl WireDecode for NodeBid {
    fn decode_from(reader: &mut WireReader<'_>) -> Result<Self, TesseraError> {
        Ok(NodeBid {
            last_block_hash: reader.read_array()?,
            address: reader.read_array()?,
            signature: reader.read_signature()?,
        })
    }
}

impl WireEncode for NodeVote {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.last_block_hash);
        out.extend_from_slice(&self.voted_for);
        out.extend_from_slice(&self.address);
        put_signature(out, &self.signature);
    }
}

impl WireDecode for NodeVote {
    fn decode_from(reader: &mut WireReader<'_>) -> Result<Self, TesseraError> {
        let last_block_hash = reader.read_array()?;
        let voted_for = reader.read_array()?;
        let address = reader.read_array()?;
        let signature = reader.read_signature()?;
        Ok(NodeVote {
            last_block_hash,
            address,
            voted_for,
            signature,
        })
    }
}
