//! Frame encoding/decoding utilities.
//!
//! Every message on the controller link is a single frame: a one byte payload
//! length, a command group, an opcode and the payload itself.
//!
//! ```text
//! +--------+-------+--------+-------------------+
//! | length | group | opcode | payload[0..len]   |
//! +--------+-------+--------+-------------------+
//! ```
//!
//! The BLE stack delivers exactly one frame per notification, so
//! [`Frame::decode`] ignores anything past the declared length. When a capture
//! holds several frames back to back, [`FrameCodec`] splits them.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// A single wire-level packet. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    group: CommandGroup,
    command_id: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame. Fails with [`ProtocolError::InvalidFrame`] if the
    /// payload does not fit the one byte length field.
    pub fn new(group: CommandGroup, command_id: u8, payload: Vec<u8>) -> ProtocolResult<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::InvalidFrame {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Frame {
            group,
            command_id,
            payload,
        })
    }

    /// Create a frame from a payload whose size is fixed by the protocol.
    pub(crate) fn fixed<const N: usize>(group: CommandGroup, opcode: Opcode, payload: [u8; N]) -> Self {
        Frame {
            group,
            command_id: opcode.as_u8(),
            payload: payload.to_vec(),
        }
    }

    /// Command group.
    pub fn group(&self) -> CommandGroup {
        self.group
    }

    /// Raw opcode byte.
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    /// Opcode, if the byte is in the protocol table.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.command_id)
    }

    /// Declared payload length.
    pub fn payload_length(&self) -> u8 {
        // Bounded by the constructors.
        self.payload.len() as u8
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total encoded size (header + payload).
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize as `[length, group, opcode, payload..]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.put_u8(self.payload_length());
        buf.put_u8(self.group.into());
        buf.put_u8(self.command_id);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse one frame from the start of `bytes`.
    ///
    /// Bytes beyond the declared payload length are ignored.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedFrame {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let len = bytes[LEN_POS] as usize;
        if bytes.len() < HEADER_SIZE + len {
            return Err(ProtocolError::TruncatedFrame {
                expected: HEADER_SIZE + len,
                actual: bytes.len(),
            });
        }

        if bytes.len() > HEADER_SIZE + len {
            log::trace!(
                "ignoring {} trailing bytes after frame",
                bytes.len() - HEADER_SIZE - len
            );
        }

        Ok(Frame {
            group: CommandGroup::from(bytes[GROUP_POS]),
            command_id: bytes[OPCODE_POS],
            payload: bytes[HEADER_SIZE..HEADER_SIZE + len].to_vec(),
        })
    }
}

/// Encode a frame in one step, validating the payload size.
pub fn encode_frame(group: CommandGroup, command_id: u8, payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    Ok(Frame::new(group, command_id, payload.to_vec())?.encode())
}

/// Splits a byte stream carrying back-to-back frames.
///
/// The header has no sync byte, so the codec trusts the stream to start on a
/// frame boundary.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD_SIZE),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take one complete frame off the front of the buffer.
    ///
    /// Returns `None` if more data is needed.
    pub fn decode(&mut self) -> Option<Frame> {
        if self.buffer.len() < HEADER_SIZE {
            return None;
        }

        let len = self.buffer[LEN_POS] as usize;
        if self.buffer.len() < HEADER_SIZE + len {
            return None;
        }

        let mut raw = self.buffer.split_to(HEADER_SIZE + len);
        let _len = raw.get_u8();
        let group = CommandGroup::from(raw.get_u8());
        let command_id = raw.get_u8();

        Some(Frame {
            group,
            command_id,
            payload: raw.to_vec(),
        })
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
