use tessera_types::constants::MAX_MESSAGE_SIZE;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RelayError;
use crate::protocol::{Opcode, FLAG_REQUEST, HEADER_LEN, PROTOCOL_VERSION};

/// One framed message: opcode, direction and opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub request: bool,
    pub payload: Vec<u8>,
}

/// Decoded fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: Opcode,
    pub request: bool,
    pub length: usize,
}

impl Frame {
    pub fn request(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            request: true,
            payload,
        }
    }

    pub fn response(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            request: false,
            payload,
        }
    }
}

/// Encode a frame: `[version][opcode][flags][u32 LE length][payload]`.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, RelayError> {
    if frame.payload.len() > MAX_MESSAGE_SIZE {
        return Err(RelayError::MessageTooLarge {
            size: frame.payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let flags = if frame.request { FLAG_REQUEST } else { 0 };
    let mut out = Vec::with_capacity(HEADER_LEN + frame.payload.len());
    out.push(PROTOCOL_VERSION);
    out.push(frame.opcode.as_u8());
    out.push(flags);
    out.extend_from_slice(&(frame.payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&frame.payload);
    Ok(out)
}

/// Parse and validate a frame header.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<FrameHeader, RelayError> {
    if header[0] != PROTOCOL_VERSION {
        return Err(RelayError::VersionMismatch {
            peer: header[0],
            ours: PROTOCOL_VERSION,
        });
    }
    let opcode = Opcode::try_from(header[1])?;
    let length = u32::from_le_bytes([header[3], header[4], header[5], header[6]]) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(RelayError::MessageTooLarge {
            size: length,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(FrameHeader {
        opcode,
        request: header[2] & FLAG_REQUEST != 0,
        length,
    })
}

/// Decode one complete frame from a byte slice.
pub fn decode_frame(data: &[u8]) -> Result<Frame, RelayError> {
    let header: &[u8; HEADER_LEN] = data
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| RelayError::ProtocolError {
            reason: "data too short for frame header".to_string(),
        })?;
    let header = decode_header(header)?;
    let body = &data[HEADER_LEN..];
    if body.len() != header.length {
        return Err(RelayError::ProtocolError {
            reason: format!(
                "payload is {} bytes, header says {}",
                body.len(),
                header.length
            ),
        });
    }
    Ok(Frame {
        opcode: header.opcode,
        request: header.request,
        payload: body.to_vec(),
    })
}

/// Read one frame from an async reader.
pub async fn read_frame<R>(io: &mut R) -> Result<Frame, RelayError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    io.read_exact(&mut header)
        .await
        .map_err(|e| RelayError::ConnectionError {
            reason: e.to_string(),
        })?;
    let header = decode_header(&header)?;

    let mut payload = vec![0u8; header.length];
    io.read_exact(&mut payload)
        .await
        .map_err(|e| RelayError::ConnectionError {
            reason: e.to_string(),
        })?;
    Ok(Frame {
        opcode: header.opcode,
        request: header.request,
        payload,
    })
}

/// Write pre-encoded frame bytes and flush.
pub async fn write_bytes<W>(io: &mut W, bytes: &[u8]) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    io.write_all(bytes)
        .await
        .map_err(|e| RelayError::ConnectionError {
            reason: e.to_string(),
        })?;
    io.flush().await.map_err(|e| RelayError::ConnectionError {
        reason: e.to_string(),
    })
}
