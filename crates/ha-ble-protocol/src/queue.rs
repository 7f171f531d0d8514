//! Reassembly of multi-frame responses.
//!
//! The controller may answer one request with several frames. They are
//! collected in a [`MessageQueue`] until the opcode's [`ReadyPolicy`] says the
//! response is complete, then the dispatcher consumes the queue once.

use crate::constants::*;
use crate::error::*;
use crate::frame::Frame;
use crate::types::Opcode;

/// Completion rule for a queued response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyPolicy {
    /// Complete as soon as one frame has arrived.
    SingleFrame,
    /// Complete once the flattened payload holds whole device records, and
    /// at least `expected_count` of them when the count is known.
    DeviceList {
        /// Device count reported by `NUM_OF_DEVS`, if any.
        expected_count: Option<u32>,
    },
}

impl ReadyPolicy {
    /// Policy for a response carrying `command_id`.
    pub fn for_command(command_id: u8, expected_count: Option<u32>) -> Self {
        match Opcode::from_u8(command_id) {
            Some(Opcode::DevWithIndex) => ReadyPolicy::DeviceList { expected_count },
            _ => ReadyPolicy::SingleFrame,
        }
    }
}

/// Ordered frames believed to belong to one logical exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQueue {
    frames: Vec<Frame>,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        MessageQueue { frames: Vec::new() }
    }

    /// Append a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Number of frames queued.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in arrival order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Opcode byte used for dispatch (taken from the first frame).
    pub fn command_id(&self) -> Option<u8> {
        self.frames.first().map(Frame::command_id)
    }

    /// Total payload bytes across all frames.
    pub fn payload_len(&self) -> usize {
        self.frames.iter().map(|f| f.payload().len()).sum()
    }

    /// Concatenation of every frame's payload, in arrival order.
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload_len());
        for frame in &self.frames {
            out.extend_from_slice(frame.payload());
        }
        out
    }

    /// Check whether the queued frames form a complete response.
    ///
    /// Returns [`ProtocolError::IncompleteDeviceList`] while a device list is
    /// still arriving and [`ProtocolError::EmptyQueue`] when nothing is queued.
    pub fn check_ready(&self, policy: &ReadyPolicy) -> ProtocolResult<()> {
        if self.frames.is_empty() {
            return Err(ProtocolError::EmptyQueue);
        }

        match *policy {
            ReadyPolicy::SingleFrame => Ok(()),
            ReadyPolicy::DeviceList { expected_count } => {
                let have = self.payload_len();
                let expected = expected_count.unwrap_or(0) as usize * DEVICE_RECORD_SIZE;
                let whole = have > 0 && have % DEVICE_RECORD_SIZE == 0;

                if whole && have >= expected {
                    Ok(())
                } else {
                    let next_record = have.div_ceil(DEVICE_RECORD_SIZE).max(1) * DEVICE_RECORD_SIZE;
                    Err(ProtocolError::IncompleteDeviceList {
                        have,
                        need: next_record.max(expected),
                    })
                }
            }
        }
    }

    /// Boolean form of [`MessageQueue::check_ready`].
    pub fn is_ready(&self, policy: &ReadyPolicy) -> bool {
        self.check_ready(policy).is_ok()
    }

    /// Move the frames out, leaving this queue empty.
    pub fn take(&mut self) -> MessageQueue {
        std::mem::take(self)
    }

    /// Drop all queued frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl From<Frame> for MessageQueue {
    fn from(frame: Frame) -> Self {
        MessageQueue {
            frames: vec![frame],
        }
    }
}
