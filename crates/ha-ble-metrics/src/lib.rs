//! Metric declarations for the controller link.
//!
//! Every metric the engine records is declared once in [`metric_defs`] as a
//! [`Metric`] constant carrying its kind, description, unit and label keys.
//! The `metrics` crate is re-exported so callers record through the same
//! version. Without an installed recorder all recording is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use ha_ble_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("living-room-hub");
//! metrics::counter!(metric_defs::FRAMES_RX.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Lowercase name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use ha_ble_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const WRITES: Metric = Metric::counter("ha_ble.link.writes")
///     .with_description("Frames written")
///     .with_unit(Unit::Count)
///     .with_labels(&["link"]);
///
/// assert_eq!(WRITES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "ha_ble.frames.rx").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn with_kind(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Histogram)
    }

    /// Set the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// Metric definitions for the controller link.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Frame Metrics
    // ========================================================================

    /// Notifications received from the transport.
    ///
    /// Labels: link
    pub const FRAMES_RX: Metric = Metric::counter("ha_ble.frames.rx")
        .with_description("Notifications received from the controller")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Frames written to the transport.
    ///
    /// Labels: link, opcode
    pub const FRAMES_TX: Metric = Metric::counter("ha_ble.frames.tx")
        .with_description("Frames written to the controller")
        .with_unit(Unit::Count)
        .with_labels(&["link", "opcode"]);

    /// Frames dropped before dispatch.
    ///
    /// Labels: link, reason (`truncated`, `unknown_opcode`, `unhandled`,
    /// `malformed`, `unsolicited`)
    pub const FRAMES_DISCARDED: Metric = Metric::counter("ha_ble.frames.discarded")
        .with_description("Frames discarded without changing state")
        .with_unit(Unit::Count)
        .with_labels(&["link", "reason"]);

    /// Received payload size.
    ///
    /// Labels: link
    pub const RX_PAYLOAD_SIZE: Metric = Metric::histogram("ha_ble.frames.rx_payload_bytes")
        .with_description("Payload size of received frames")
        .with_unit(Unit::Bytes)
        .with_labels(&["link"]);

    // ========================================================================
    // Exchange Metrics
    // ========================================================================

    /// Completed responses handed to a handler.
    ///
    /// Labels: link, opcode
    pub const RESPONSES_DISPATCHED: Metric = Metric::counter("ha_ble.responses.dispatched")
        .with_description("Complete responses dispatched by opcode")
        .with_unit(Unit::Count)
        .with_labels(&["link", "opcode"]);

    /// Frames collected into one response before it completed.
    ///
    /// Labels: link, opcode
    pub const RESPONSE_FRAMES: Metric = Metric::histogram("ha_ble.responses.frames")
        .with_description("Frames per completed response")
        .with_unit(Unit::Count)
        .with_labels(&["link", "opcode"]);

    /// Requests re-sent after a response timeout.
    ///
    /// Labels: link
    pub const REQUEST_RETRIES: Metric = Metric::counter("ha_ble.requests.retries")
        .with_description("Requests re-sent after a timeout")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Exchanges abandoned after the last retry timed out.
    ///
    /// Labels: link
    pub const RESPONSE_TIMEOUTS: Metric = Metric::counter("ha_ble.responses.timeouts")
        .with_description("Exchanges abandoned after the retry budget ran out")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Errors reported to the result sink.
    ///
    /// Labels: link, kind
    pub const ERRORS_REPORTED: Metric = Metric::counter("ha_ble.errors.reported")
        .with_description("Errors surfaced to the UI")
        .with_unit(Unit::Count)
        .with_labels(&["link", "kind"]);

    // ========================================================================
    // Tree Metrics
    // ========================================================================

    /// Zones in the published tree.
    ///
    /// Labels: link
    pub const ZONES: Metric = Metric::gauge("ha_ble.tree.zones")
        .with_description("Zones in the current tree")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Devices in the published tree.
    ///
    /// Labels: link
    pub const DEVICES: Metric = Metric::gauge("ha_ble.tree.devices")
        .with_description("Devices in the current tree")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Device value updates merged into the tree.
    ///
    /// Labels: link
    pub const VALUE_UPDATES: Metric = Metric::counter("ha_ble.tree.value_updates")
        .with_description("Single-device value updates merged into the tree")
        .with_unit(Unit::Count)
        .with_labels(&["link"]);

    /// Every metric, for bulk description.
    pub const ALL: &[Metric] = &[
        FRAMES_RX,
        FRAMES_TX,
        FRAMES_DISCARDED,
        RX_PAYLOAD_SIZE,
        RESPONSES_DISPATCHED,
        RESPONSE_FRAMES,
        REQUEST_RETRIES,
        RESPONSE_TIMEOUTS,
        ERRORS_REPORTED,
        ZONES,
        DEVICES,
        VALUE_UPDATES,
    ];
}

/// Labels identifying one controller link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Link (engine) name from the configuration.
    pub link: String,
}

impl MetricLabels {
    /// Labels for the link called `link`.
    pub fn new(link: impl Into<String>) -> Self {
        Self { link: link.into() }
    }

    /// Labels in the `metrics` crate format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("link", self.link.clone())]
    }

    /// Standard labels plus `extra`.
    ///
    /// ```rust
    /// use ha_ble_metrics::MetricLabels;
    ///
    /// let labels = MetricLabels::new("hub").with(&[("opcode", "DEV_VAL".to_string())]);
    /// assert_eq!(labels.len(), 2);
    /// ```
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
