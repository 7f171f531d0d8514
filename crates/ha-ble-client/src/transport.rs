//! Host collaborator interfaces.
//!
//! The dispatcher does not own a radio, a UI or a clock. The host supplies
//! them at construction:
//!
//! - [`Transport`]: writes bytes to the controller's write characteristic.
//!   Inbound bytes arrive as calls to `Dispatcher::on_notify`.
//! - [`ResultSink`]: receives the decoded zone tree and user-visible errors.
//! - [`Timer`]: a one-shot response timer. When it fires, the host calls
//!   `Dispatcher::on_timeout`.
//!
//! The `Recording*` and [`ManualTimer`] types implement these traits by
//! storing what they are given; the replay tool and tests drive the
//! dispatcher with them.

use std::time::Duration;

use ha_ble_protocol::ZoneTree;
use serde::Serialize;

/// User-visible failure of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A response could not be decoded; the tree was left untouched.
    MalformedPayload,
    /// The controller did not answer, even after the retry.
    ProtocolTimeout,
    /// A notification was shorter than its header declared.
    TruncatedFrame,
}

impl ErrorKind {
    /// Short name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedPayload => "malformed_payload",
            ErrorKind::ProtocolTimeout => "protocol_timeout",
            ErrorKind::TruncatedFrame => "truncated_frame",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound half of the BLE link.
pub trait Transport {
    /// Write one encoded frame. Fire-and-forget.
    fn write(&mut self, bytes: &[u8]);
}

/// Consumer of decoded results (normally the UI).
pub trait ResultSink {
    /// The zone tree changed.
    fn on_zones_updated(&mut self, zones: &ZoneTree);

    /// An exchange failed.
    fn on_error(&mut self, kind: ErrorKind);
}

/// One-shot timer supplied by the host.
pub trait Timer {
    /// Start (or restart) the timer.
    fn arm(&mut self, timeout: Duration);

    /// Stop the timer if it is running.
    fn cancel(&mut self);
}

/// Transport that keeps every written frame.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    written: Vec<Vec<u8>>,
}

impl RecordingTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far, oldest first.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Remove and return the frames written so far.
    pub fn take_written(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.written)
    }
}

impl Transport for RecordingTransport {
    fn write(&mut self, bytes: &[u8]) {
        self.written.push(bytes.to_vec());
    }
}

/// Sink that keeps every published tree and error.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Vec<ZoneTree>,
    errors: Vec<ErrorKind>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Published trees, oldest first.
    pub fn updates(&self) -> &[ZoneTree] {
        &self.updates
    }

    /// Most recently published tree.
    pub fn latest(&self) -> Option<&ZoneTree> {
        self.updates.last()
    }

    /// Reported errors, oldest first.
    pub fn errors(&self) -> &[ErrorKind] {
        &self.errors
    }

    /// Remove and return everything recorded so far.
    pub fn take(&mut self) -> (Vec<ZoneTree>, Vec<ErrorKind>) {
        (
            std::mem::take(&mut self.updates),
            std::mem::take(&mut self.errors),
        )
    }
}

impl ResultSink for RecordingSink {
    fn on_zones_updated(&mut self, zones: &ZoneTree) {
        self.updates.push(zones.clone());
    }

    fn on_error(&mut self, kind: ErrorKind) {
        self.errors.push(kind);
    }
}

/// Timer that only records arm/cancel calls; the caller fires it by hand.
#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: Option<Duration>,
    arm_count: u32,
    cancel_count: u32,
}

impl ManualTimer {
    /// Create an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout of the running timer, if armed.
    pub fn armed(&self) -> Option<Duration> {
        self.armed
    }

    /// Whether the timer is running.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Number of `arm` calls.
    pub fn arm_count(&self) -> u32 {
        self.arm_count
    }

    /// Number of `cancel` calls.
    pub fn cancel_count(&self) -> u32 {
        self.cancel_count
    }
}

impl Timer for ManualTimer {
    fn arm(&mut self, timeout: Duration) {
        self.armed = Some(timeout);
        self.arm_count += 1;
    }

    fn cancel(&mut self) {
        self.armed = None;
        self.cancel_count += 1;
    }
}
