//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the controller protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the header or the declared payload length.
    #[error("truncated frame: expected at least {expected} bytes, got {actual}")]
    TruncatedFrame {
        /// Bytes required by the header and length field.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Payload does not fit the one byte length field.
    #[error("invalid frame: payload of {len} bytes exceeds the {max} byte limit")]
    InvalidFrame {
        /// Payload length that was requested.
        len: usize,
        /// Largest payload a frame can carry.
        max: usize,
    },

    /// Device-list payload is not a whole number of records.
    #[error("malformed payload: {len} bytes is not a multiple of the {record_size} byte record")]
    MalformedPayload {
        /// Flattened payload length.
        len: usize,
        /// Record size the payload should be a multiple of.
        record_size: usize,
    },

    /// A fixed-layout payload is shorter than its layout.
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        /// Minimum length of the layout.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// The device-list response has not fully arrived yet.
    #[error("incomplete device list: have {have} bytes, need {need}")]
    IncompleteDeviceList {
        /// Payload bytes accumulated so far.
        have: usize,
        /// Payload bytes required before the list is complete.
        need: usize,
    },

    /// Queue has no frames to dispatch.
    #[error("message queue is empty")]
    EmptyQueue,

    /// Opcode outside the protocol's command table.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
}

impl ProtocolError {
    /// Whether the error only means "keep accumulating frames".
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ProtocolError::IncompleteDeviceList { .. } | ProtocolError::EmptyQueue
        )
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
