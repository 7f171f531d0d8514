//! Command dispatcher for the controller link.
//!
//! The dispatcher owns the in-flight [`MessageQueue`] and the current
//! [`ZoneTree`]. It turns inbound notifications into frames, collects
//! multi-frame responses, interprets complete responses by opcode and drives
//! the device-list refresh:
//!
//! 1. `request_device_list` sends `GET NUM_OF_DEVS`.
//! 2. The count reply triggers `GET DEV_WITH_INDEX` for every device.
//! 3. The complete list replaces the tree, which is published to the sink.
//!
//! `DEV_VAL` notifications are merged into the tree in any state. Everything
//! runs synchronously inside the host's callbacks; waiting for a reply is
//! accumulation across `on_notify` calls plus the host [`Timer`].

use std::fmt;

use ha_ble_metrics::{metric_defs, MetricLabels};
use ha_ble_protocol::{
    Command, DeviceId, DeviceUpdate, Frame, MessageQueue, Opcode, ProtocolError, ReadyPolicy,
    Response, UpsertOutcome, ZoneTree,
};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::transport::{ErrorKind, ResultSink, Timer, Transport};

// ============================================================================
// Dispatcher State
// ============================================================================

/// Where the device-list exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// No request outstanding.
    #[default]
    Idle,
    /// `GET NUM_OF_DEVS` sent, waiting for the count.
    AwaitingCount,
    /// `GET DEV_WITH_INDEX` sent, waiting for the whole list.
    AwaitingDeviceList,
}

impl DispatcherState {
    /// Opcode of the reply this state is waiting for.
    pub fn awaited_opcode(self) -> Option<Opcode> {
        match self {
            DispatcherState::Idle => None,
            DispatcherState::AwaitingCount => Some(Opcode::NumOfDevs),
            DispatcherState::AwaitingDeviceList => Some(Opcode::DevWithIndex),
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatcherState::Idle => "idle",
            DispatcherState::AwaitingCount => "awaiting_count",
            DispatcherState::AwaitingDeviceList => "awaiting_device_list",
        })
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Protocol engine for one controller connection.
pub struct Dispatcher<T, S, M> {
    config: EngineConfig,
    transport: T,
    sink: S,
    timer: M,
    labels: MetricLabels,

    state: DispatcherState,
    queue: MessageQueue,
    tree: ZoneTree,
    device_count: Option<u32>,

    // Request awaiting a reply, kept for the retry
    pending: Option<Command>,
    retries: u32,
}

impl<T: Transport, S: ResultSink, M: Timer> Dispatcher<T, S, M> {
    /// Create a dispatcher with its collaborators.
    pub fn new(config: EngineConfig, transport: T, sink: S, timer: M) -> Self {
        let labels = MetricLabels::new(config.name.clone());
        Dispatcher {
            config,
            transport,
            sink,
            timer,
            labels,
            state: DispatcherState::Idle,
            queue: MessageQueue::new(),
            tree: ZoneTree::new(),
            device_count: None,
            pending: None,
            retries: 0,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Current zone tree.
    pub fn zones(&self) -> &ZoneTree {
        &self.tree
    }

    /// Device count from the last `NUM_OF_DEVS` reply of this exchange.
    pub fn device_count(&self) -> Option<u32> {
        self.device_count
    }

    /// Frames collected for a response that is not complete yet.
    pub fn pending_queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Get the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get the result sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Get the result sink mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Get the timer.
    pub fn timer(&self) -> &M {
        &self.timer
    }

    // ========================================================================
    // Local Actions
    // ========================================================================

    /// Start a device-list refresh.
    ///
    /// Fails with [`DispatchError::Busy`] while another refresh is in flight.
    pub fn request_device_list(&mut self) -> DispatchResult<()> {
        if self.state != DispatcherState::Idle {
            return Err(DispatchError::Busy(self.state));
        }

        if !self.queue.is_empty() {
            debug!(
                "Dispatcher[{}]: Dropping {} stale frames before refresh",
                self.config.name,
                self.queue.len()
            );
            self.queue.clear();
        }

        self.device_count = None;
        self.state = DispatcherState::AwaitingCount;
        self.send_request(Command::GetDeviceCount);
        Ok(())
    }

    /// Ask the controller to change a device's value.
    ///
    /// The tree is updated when the controller confirms with `DEV_VAL`.
    pub fn set_device_value(&mut self, id: DeviceId, value: i16) {
        self.send(&Command::SetDeviceValue { id, value });
    }

    /// Ask the controller for a zone's name.
    pub fn request_zone_name(&mut self, zone: u8) {
        self.send(&Command::GetZoneName { zone });
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    /// Handle one notification from the transport.
    ///
    /// A buffer that does not hold a whole frame is logged and discarded and
    /// returned as [`DispatchError::Protocol`]; the exchange is unaffected.
    pub fn on_notify(&mut self, bytes: &[u8]) -> DispatchResult<()> {
        metrics::counter!(metric_defs::FRAMES_RX.name, &self.labels.to_labels()).increment(1);

        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dispatcher[{}]: Discarding notification: {}", self.config.name, e);
                self.count_discard("truncated");
                if self.config.report_truncated_frames {
                    self.report_error(ErrorKind::TruncatedFrame);
                }
                return Err(e.into());
            }
        };

        self.on_frame(frame);
        Ok(())
    }

    /// Handle one already-decoded frame.
    pub fn on_frame(&mut self, frame: Frame) {
        metrics::histogram!(metric_defs::RX_PAYLOAD_SIZE.name, &self.labels.to_labels())
            .record(frame.payload().len() as f64);

        let Some(opcode) = frame.opcode() else {
            warn!(
                "Dispatcher[{}]: Ignoring frame with unknown opcode 0x{:02X}",
                self.config.name,
                frame.command_id()
            );
            self.count_discard("unknown_opcode");
            return;
        };

        trace!(
            "Dispatcher[{}]: Received {} ({} bytes) in state {}",
            self.config.name,
            opcode,
            frame.payload().len(),
            self.state
        );

        let policy = self.ready_policy(opcode);
        if policy == ReadyPolicy::SingleFrame {
            // Complete on its own; never joins a queue of another opcode.
            self.dispatch(MessageQueue::from(frame));
            return;
        }

        self.queue.push(frame);
        match self.queue.check_ready(&policy) {
            Ok(()) => {
                let queue = self.queue.take();
                self.dispatch(queue);
            }
            Err(e) if self.is_awaited(opcode) => {
                trace!("Dispatcher[{}]: Waiting for more frames: {}", self.config.name, e);
                // The quiet period runs from the last frame received.
                self.timer.arm(self.config.response_timeout());
            }
            Err(e) => {
                debug!(
                    "Dispatcher[{}]: Dropping partial unsolicited {}: {}",
                    self.config.name, opcode, e
                );
                self.count_discard("incomplete");
                self.queue.clear();
            }
        }
    }

    /// The transport disconnected. Drops all per-connection state.
    pub fn on_disconnect(&mut self) {
        debug!(
            "Dispatcher[{}]: Disconnected in state {}, discarding {} queued frames",
            self.config.name,
            self.state,
            self.queue.len()
        );

        self.end_exchange();
        self.device_count = None;
        self.queue.clear();
        self.tree.clear();
        self.record_tree_size();
    }

    /// The host timer armed by the dispatcher fired.
    ///
    /// If part of the device list arrived, the reply has gone quiet and is
    /// processed as it stands. Otherwise the request is re-sent up to
    /// `max_retries` times before [`ErrorKind::ProtocolTimeout`] is reported.
    pub fn on_timeout(&mut self) {
        let Some(command) = self.pending else {
            trace!("Dispatcher[{}]: Ignoring stale timeout", self.config.name);
            return;
        };

        if self.state == DispatcherState::AwaitingDeviceList && !self.queue.is_empty() {
            debug!(
                "Dispatcher[{}]: Device list quiet after {} bytes, processing what arrived",
                self.config.name,
                self.queue.payload_len()
            );
            let queue = self.queue.take();
            self.dispatch(queue);
            return;
        }

        if self.retries < self.config.max_retries {
            self.retries += 1;
            debug!(
                "Dispatcher[{}]: No reply to {} in state {}, retry {}/{}",
                self.config.name,
                command.opcode(),
                self.state,
                self.retries,
                self.config.max_retries
            );
            metrics::counter!(metric_defs::REQUEST_RETRIES.name, &self.labels.to_labels())
                .increment(1);
            self.queue.clear();
            self.send(&command);
            self.timer.arm(self.config.response_timeout());
            return;
        }

        warn!(
            "Dispatcher[{}]: No reply to {} after {} retries, giving up",
            self.config.name,
            command.opcode(),
            self.retries
        );
        metrics::counter!(metric_defs::RESPONSE_TIMEOUTS.name, &self.labels.to_labels())
            .increment(1);
        self.queue.clear();
        self.end_exchange();
        self.report_error(ErrorKind::ProtocolTimeout);
    }

    // ========================================================================
    // Response Handling
    // ========================================================================

    fn ready_policy(&self, opcode: Opcode) -> ReadyPolicy {
        let expected_count = match self.state {
            DispatcherState::AwaitingDeviceList => self.device_count,
            _ => None,
        };
        ReadyPolicy::for_command(opcode.as_u8(), expected_count)
    }

    /// Whether `opcode` answers the request this exchange is waiting on.
    fn is_awaited(&self, opcode: Opcode) -> bool {
        self.state.awaited_opcode() == Some(opcode)
    }

    /// Interpret a complete response. Consumes the queue.
    fn dispatch(&mut self, queue: MessageQueue) {
        let Some(opcode) = queue.command_id().and_then(Opcode::from_u8) else {
            return;
        };

        let opcode_label = [("opcode", opcode.name().to_string())];
        metrics::counter!(
            metric_defs::RESPONSES_DISPATCHED.name,
            &self.labels.with(&opcode_label)
        )
        .increment(1);
        metrics::histogram!(metric_defs::RESPONSE_FRAMES.name, &self.labels.with(&opcode_label))
            .record(queue.len() as f64);

        let payload = queue.flatten();
        match Response::decode(opcode.as_u8(), &payload, self.config.id_layout) {
            Ok(Response::DeviceCount(count)) => self.handle_device_count(count),
            Ok(Response::DeviceList(tree)) => self.handle_device_list(tree),
            Ok(Response::DeviceValue(update)) => self.handle_device_value(update),
            Ok(Response::ZoneName { zone, name }) => self.handle_zone_name(zone, name),
            Ok(Response::Unhandled(op)) => {
                debug!("Dispatcher[{}]: Ignoring {} response", self.config.name, op);
                self.count_discard("unhandled");
            }
            Err(e) => self.handle_decode_error(opcode, e),
        }
    }

    fn handle_device_count(&mut self, count: u32) {
        if !self.is_awaited(Opcode::NumOfDevs) {
            debug!(
                "Dispatcher[{}]: Ignoring unsolicited device count {}",
                self.config.name, count
            );
            self.count_discard("unsolicited");
            return;
        }

        self.device_count = Some(count);
        debug!("Dispatcher[{}]: Controller reports {} devices", self.config.name, count);

        if count == 0 {
            self.end_exchange();
            self.tree.clear();
            self.publish();
            return;
        }

        self.queue.clear();
        self.state = DispatcherState::AwaitingDeviceList;
        self.send_request(Command::get_all_devices());
    }

    fn handle_device_list(&mut self, mut tree: ZoneTree) {
        if self.is_awaited(Opcode::DevWithIndex) {
            debug!(
                "Dispatcher[{}]: Device list complete: {} devices in {} zones",
                self.config.name,
                tree.device_count(),
                tree.len()
            );

            if let Some(expected) = self.device_count {
                if tree.device_count() < expected as usize {
                    warn!(
                        "Dispatcher[{}]: Expected {} devices, list holds {}",
                        self.config.name,
                        expected,
                        tree.device_count()
                    );
                }
            }

            // Names fetched earlier survive a refresh.
            for zone in self.tree.zones() {
                if let Some(name) = &zone.name {
                    tree.set_zone_name(zone.id, name.clone());
                }
            }

            self.tree = tree;
            self.end_exchange();
        } else {
            debug!(
                "Dispatcher[{}]: Merging unsolicited device list ({} devices)",
                self.config.name,
                tree.device_count()
            );
            self.tree.merge(tree, self.config.id_layout);
        }

        self.publish();
    }

    fn handle_device_value(&mut self, update: DeviceUpdate) {
        let outcome = match self.tree.update_value(update.id, update.value) {
            Some(outcome) => outcome,
            None => self
                .tree
                .upsert_device(update.to_record(self.config.id_layout), self.config.id_layout),
        };

        trace!(
            "Dispatcher[{}]: Device {} = {} ({:?})",
            self.config.name,
            update.id,
            update.value,
            outcome
        );

        if outcome != UpsertOutcome::Unchanged {
            metrics::counter!(metric_defs::VALUE_UPDATES.name, &self.labels.to_labels())
                .increment(1);
            self.publish();
        }
    }

    fn handle_zone_name(&mut self, zone: u8, name: String) {
        if self.tree.set_zone_name(zone, name.as_str()) {
            debug!("Dispatcher[{}]: Zone {} is '{}'", self.config.name, zone, name);
            self.publish();
        } else {
            debug!(
                "Dispatcher[{}]: Ignoring name '{}' for unknown zone {}",
                self.config.name, name, zone
            );
            self.count_discard("unknown_zone");
        }
    }

    fn handle_decode_error(&mut self, opcode: Opcode, error: ProtocolError) {
        warn!(
            "Dispatcher[{}]: Discarding {} response: {}",
            self.config.name, opcode, error
        );
        self.count_discard("malformed");

        // Unsolicited frames are dropped quietly; the awaited reply ends the exchange.
        if self.is_awaited(opcode) {
            self.end_exchange();
            self.report_error(ErrorKind::MalformedPayload);
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Send a request that expects a reply and start the response timer.
    fn send_request(&mut self, command: Command) {
        self.pending = Some(command);
        self.retries = 0;
        self.send(&command);
        self.timer.arm(self.config.response_timeout());
    }

    fn send(&mut self, command: &Command) {
        let bytes = command.encode();
        debug!(
            "Dispatcher[{}]: Sending {} ({} bytes)",
            self.config.name,
            command.opcode(),
            bytes.len()
        );
        metrics::counter!(
            metric_defs::FRAMES_TX.name,
            &self.labels.with(&[("opcode", command.opcode().name().to_string())])
        )
        .increment(1);
        self.transport.write(&bytes);
    }

    /// Return to Idle, forgetting the outstanding request.
    fn end_exchange(&mut self) {
        if self.pending.take().is_some() {
            self.timer.cancel();
        }
        self.retries = 0;
        self.state = DispatcherState::Idle;
    }

    fn publish(&mut self) {
        self.record_tree_size();
        self.sink.on_zones_updated(&self.tree);
    }

    fn report_error(&mut self, kind: ErrorKind) {
        metrics::counter!(
            metric_defs::ERRORS_REPORTED.name,
            &self.labels.with(&[("kind", kind.as_str().to_string())])
        )
        .increment(1);
        self.sink.on_error(kind);
    }

    fn count_discard(&self, reason: &'static str) {
        metrics::counter!(
            metric_defs::FRAMES_DISCARDED.name,
            &self.labels.with(&[("reason", reason.to_string())])
        )
        .increment(1);
    }

    fn record_tree_size(&self) {
        let labels = self.labels.to_labels();
        metrics::gauge!(metric_defs::ZONES.name, &labels).set(self.tree.len() as f64);
        metrics::gauge!(metric_defs::DEVICES.name, &labels).set(self.tree.device_count() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ManualTimer, RecordingSink, RecordingTransport};
    use ha_ble_protocol::{CommandGroup, OP_DEV_WITH_INDEX, OP_NUM_OF_DEVS};

    type TestDispatcher = Dispatcher<RecordingTransport, RecordingSink, ManualTimer>;

    fn dispatcher() -> TestDispatcher {
        Dispatcher::new(
            EngineConfig::default(),
            RecordingTransport::new(),
            RecordingSink::new(),
            ManualTimer::new(),
        )
    }

    fn frame(command_id: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(CommandGroup::Set, command_id, payload.to_vec())
            .unwrap()
            .encode()
    }

    #[test]
    fn test_initial_state() {
        let d = dispatcher();
        assert_eq!(d.state(), DispatcherState::Idle);
        assert!(d.zones().is_empty());
        assert_eq!(d.device_count(), None);
        assert!(d.transport().written().is_empty());
    }

    #[test]
    fn test_request_device_list_sends_count_request() {
        let mut d = dispatcher();
        d.request_device_list().unwrap();

        assert_eq!(d.state(), DispatcherState::AwaitingCount);
        assert_eq!(d.transport().written(), &[vec![0x00, 0x01, 0x01]]);
        assert!(d.timer().is_armed());
    }

    #[test]
    fn test_request_while_busy() {
        let mut d = dispatcher();
        d.request_device_list().unwrap();
        assert_eq!(
            d.request_device_list(),
            Err(DispatchError::Busy(DispatcherState::AwaitingCount))
        );
        assert_eq!(d.transport().written().len(), 1);
    }

    #[test]
    fn test_zero_devices_publishes_empty_tree() {
        let mut d = dispatcher();
        d.request_device_list().unwrap();
        d.on_notify(&frame(OP_NUM_OF_DEVS, &[0, 0, 0])).unwrap();

        assert_eq!(d.state(), DispatcherState::Idle);
        assert_eq!(d.transport().written().len(), 1);
        assert_eq!(d.sink().updates().len(), 1);
        assert!(d.sink().latest().unwrap().is_empty());
        assert!(!d.timer().is_armed());
    }

    #[test]
    fn test_unsolicited_count_is_ignored() {
        let mut d = dispatcher();
        d.on_notify(&frame(OP_NUM_OF_DEVS, &[0, 0, 4])).unwrap();
        assert_eq!(d.state(), DispatcherState::Idle);
        assert_eq!(d.device_count(), None);
        assert!(d.transport().written().is_empty());
    }

    #[test]
    fn test_truncated_notification() {
        let mut d = dispatcher();
        d.request_device_list().unwrap();
        let err = d.on_notify(&[0x03, 0x00, 0x01, 0x00]).unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::TruncatedFrame { .. })
        ));
        assert_eq!(d.state(), DispatcherState::AwaitingCount);
        assert!(d.sink().errors().is_empty());
    }

    #[test]
    fn test_truncated_notification_reported_when_configured() {
        let config = EngineConfig {
            report_truncated_frames: true,
            ..EngineConfig::default()
        };
        let mut d = Dispatcher::new(
            config,
            RecordingTransport::new(),
            RecordingSink::new(),
            ManualTimer::new(),
        );
        assert!(d.on_notify(&[0x01]).is_err());
        assert_eq!(d.sink().errors(), &[ErrorKind::TruncatedFrame]);
    }

    #[test]
    fn test_partial_list_is_held_in_queue() {
        let mut d = dispatcher();
        d.request_device_list().unwrap();
        d.on_notify(&frame(OP_NUM_OF_DEVS, &[0, 0, 1])).unwrap();
        d.on_notify(&frame(OP_DEV_WITH_INDEX, &[0; 6])).unwrap();

        assert_eq!(d.state(), DispatcherState::AwaitingDeviceList);
        assert_eq!(d.pending_queue().len(), 1);
        assert!(d.sink().updates().is_empty());
    }

    #[test]
    fn test_list_frame_restarts_timer() {
        let mut d = dispatcher();
        d.request_device_list().unwrap();
        d.on_notify(&frame(OP_NUM_OF_DEVS, &[0, 0, 2])).unwrap();
        assert_eq!(d.timer().arm_count(), 2);

        d.on_notify(&frame(OP_DEV_WITH_INDEX, &[0; 7])).unwrap();
        assert_eq!(d.timer().arm_count(), 3);
        assert!(d.timer().is_armed());
        assert!(d.sink().errors().is_empty());
    }

    #[test]
    fn test_partial_unsolicited_list_is_dropped() {
        let mut d = dispatcher();
        d.on_notify(&frame(OP_DEV_WITH_INDEX, &[0; 13])).unwrap();

        assert_eq!(d.state(), DispatcherState::Idle);
        assert!(d.pending_queue().is_empty());
        assert!(d.sink().updates().is_empty());
        assert!(!d.timer().is_armed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DispatcherState::AwaitingDeviceList.to_string(), "awaiting_device_list");
        assert_eq!(DispatcherState::Idle.awaited_opcode(), None);
        assert_eq!(
            DispatcherState::AwaitingCount.awaited_opcode(),
            Some(Opcode::NumOfDevs)
        );
    }
}
