//! Scripted replay of a controller session.
//!
//! A script is a YAML list of steps fed to a [`Dispatcher`] wired to the
//! recording collaborators. Each step yields a [`StepOutcome`] with the
//! frames written, trees published and errors reported while it ran.
//!
//! ```yaml
//! config:
//!   name: hall
//! steps:
//!   - request_device_list
//!   - notify: "03 00 01 00 00 02"
//!   - stream: "0a 00 02 00000000 00000003 0002 0a 00 02 00000001 01000041 0000"
//!   - timeout
//!   - set_value: { id: 16777281, value: 1 }
//!   - request_zone_name: { zone: 1 }
//!   - disconnect
//! ```

use std::path::Path;

use ha_ble_protocol::{DeviceId, FrameCodec, ZoneTree};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, DispatcherState};
use crate::transport::{ErrorKind, ManualTimer, RecordingSink, RecordingTransport};

/// One scripted event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Start a device-list refresh.
    RequestDeviceList,
    /// One notification carrying exactly one frame (hex).
    Notify(String),
    /// Raw bytes that may hold several frames back to back (hex).
    Stream(String),
    /// Fire the response timer.
    Timeout,
    /// Drop the connection.
    Disconnect,
    /// Send `SET DEV_VAL`.
    SetValue {
        /// Packed device id.
        id: u32,
        /// New value.
        value: i16,
    },
    /// Send `GET ZONE_NAME`.
    RequestZoneName {
        /// Zone number.
        zone: u8,
    },
}

impl Step {
    /// Short description for output.
    pub fn label(&self) -> String {
        match self {
            Step::RequestDeviceList => "request_device_list".to_string(),
            Step::Notify(hex) => format!("notify {}", hex.trim()),
            Step::Stream(hex) => format!("stream {}", hex.trim()),
            Step::Timeout => "timeout".to_string(),
            Step::Disconnect => "disconnect".to_string(),
            Step::SetValue { id, value } => format!("set_value {} = {}", DeviceId(*id), value),
            Step::RequestZoneName { zone } => format!("request_zone_name {}", zone),
        }
    }
}

/// A replay script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Engine configuration; overridden by `--config` on the command line.
    pub config: Option<EngineConfig>,
    /// Steps in order. Each is a bare name or a single-key map.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

impl Script {
    /// Parse a YAML script.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ReplayError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML script from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}

/// Errors loading or running a script.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The script file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The script is not valid YAML for the step schema.
    #[error("invalid script: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `notify` or `stream` step does not hold valid hex.
    #[error("step {step}: invalid hex: {source}")]
    Hex {
        /// Step number (1-based).
        step: usize,
        /// Decoder error.
        source: hex::FromHexError,
    },
}

/// What happened while one step ran.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Step number (1-based).
    pub step: usize,
    /// Step description.
    pub action: String,
    /// Frames written to the transport, as hex.
    pub written: Vec<String>,
    /// Trees published to the sink.
    pub updates: Vec<ZoneTree>,
    /// Errors reported to the sink.
    pub errors: Vec<ErrorKind>,
    /// Error returned to the caller, if the dispatcher refused the step.
    pub rejected: Option<String>,
    /// Dispatcher state after the step.
    pub state: DispatcherState,
}

/// Decode hex, ignoring whitespace and `:`/`-` separators.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(compact)
}

/// A dispatcher driven by script steps.
pub struct Replay {
    dispatcher: Dispatcher<RecordingTransport, RecordingSink, ManualTimer>,
    codec: FrameCodec,
}

impl Replay {
    /// Create a replay session.
    pub fn new(config: EngineConfig) -> Self {
        Replay {
            dispatcher: Dispatcher::new(
                config,
                RecordingTransport::new(),
                RecordingSink::new(),
                ManualTimer::new(),
            ),
            codec: FrameCodec::new(),
        }
    }

    /// The dispatcher under test.
    pub fn dispatcher(&self) -> &Dispatcher<RecordingTransport, RecordingSink, ManualTimer> {
        &self.dispatcher
    }

    /// Run every step in order.
    pub fn run(&mut self, steps: &[Step]) -> Result<Vec<StepOutcome>, ReplayError> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            outcomes.push(self.run_step(i + 1, step)?);
        }
        info!("Replayed {} steps", steps.len());
        Ok(outcomes)
    }

    /// Run one step. `number` is used in output and errors.
    pub fn run_step(&mut self, number: usize, step: &Step) -> Result<StepOutcome, ReplayError> {
        debug!("Replay step {}: {}", number, step.label());

        let mut rejected = None;
        match step {
            Step::RequestDeviceList => {
                if let Err(e) = self.dispatcher.request_device_list() {
                    rejected = Some(e.to_string());
                }
            }
            Step::Notify(text) => {
                let bytes = decode_hex(text).map_err(|source| ReplayError::Hex {
                    step: number,
                    source,
                })?;
                if let Err(e) = self.dispatcher.on_notify(&bytes) {
                    rejected = Some(e.to_string());
                }
            }
            Step::Stream(text) => {
                let bytes = decode_hex(text).map_err(|source| ReplayError::Hex {
                    step: number,
                    source,
                })?;
                self.codec.push(&bytes);
                while let Some(frame) = self.codec.decode() {
                    self.dispatcher.on_frame(frame);
                }
                if self.codec.buffered_len() > 0 {
                    debug!(
                        "Replay step {}: {} bytes left for the next stream step",
                        number,
                        self.codec.buffered_len()
                    );
                }
            }
            Step::Timeout => self.dispatcher.on_timeout(),
            Step::Disconnect => {
                self.codec.clear();
                self.dispatcher.on_disconnect();
            }
            Step::SetValue { id, value } => {
                self.dispatcher.set_device_value(DeviceId(*id), *value);
            }
            Step::RequestZoneName { zone } => self.dispatcher.request_zone_name(*zone),
        }

        let written = self
            .dispatcher
            .transport_mut()
            .take_written()
            .iter()
            .map(hex::encode)
            .collect();
        let (updates, errors) = self.dispatcher.sink_mut().take();

        Ok(StepOutcome {
            step: number,
            action: step.label(),
            written,
            updates,
            errors,
            rejected,
            state: self.dispatcher.state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_ble_protocol::IdLayout;

    #[test]
    fn test_decode_hex_separators() {
        assert_eq!(decode_hex("03 00 01:aa-BB 05").unwrap(), vec![3, 0, 1, 0xAA, 0xBB, 5]);
        assert!(decode_hex("0").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_parse_script() {
        let script = Script::from_yaml_str(
            r#"
config:
  name: hall
  id_layout: zone_in_endpoint_byte
steps:
  - request_device_list
  - notify: "03 00 01 00 00 02"
  - timeout
  - set_value: { id: 16777281, value: 1 }
  - request_zone_name: { zone: 1 }
  - disconnect
"#,
        )
        .unwrap();

        let config = script.config.unwrap();
        assert_eq!(config.name, "hall");
        assert_eq!(config.id_layout, IdLayout::ZoneInEndpointByte);
        assert_eq!(script.steps.len(), 6);
        assert_eq!(script.steps[0], Step::RequestDeviceList);
        assert_eq!(
            script.steps[3],
            Step::SetValue {
                id: 0x0100_0041,
                value: 1
            }
        );
    }

    #[test]
    fn test_full_session() {
        let mut replay = Replay::new(EngineConfig::default());
        let steps = vec![
            Step::RequestDeviceList,
            Step::Notify("03 00 01 00 00 02".to_string()),
            Step::Stream(
                "0a 00 02 00000000 00000003 0002 0a 00 02 00000001 01000041 0000".to_string(),
            ),
        ];
        let outcomes = replay.run(&steps).unwrap();

        assert_eq!(outcomes[0].written, vec!["000101".to_string()]);
        assert_eq!(outcomes[0].state, DispatcherState::AwaitingCount);
        assert_eq!(outcomes[1].written, vec!["040102ffffffff".to_string()]);
        assert_eq!(outcomes[2].state, DispatcherState::Idle);
        assert_eq!(outcomes[2].updates.len(), 1);
        assert_eq!(outcomes[2].updates[0].device_count(), 2);
    }

    #[test]
    fn test_demo_script() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/refresh.yaml");
        let script = Script::load(path).unwrap();
        assert_eq!(script.steps.len(), 9);
        assert_eq!(script.steps[5], Step::RequestZoneName { zone: 1 });

        let config = script.config.unwrap();
        assert_eq!(config.name, "hall");
        let mut replay = Replay::new(config);
        let outcomes = replay.run(&script.steps).unwrap();

        assert_eq!(outcomes[0].written, vec!["000101".to_string()]);
        assert_eq!(outcomes[2].state, DispatcherState::AwaitingDeviceList);
        assert!(outcomes[2].updates.is_empty());
        assert_eq!(outcomes[3].state, DispatcherState::Idle);
        assert_eq!(outcomes[3].updates[0].device_count(), 2);

        let bulb = DeviceId(0x0100_0041);
        let pushed = &outcomes[4].updates[0];
        assert_eq!(pushed.find_device(bulb).map(|d| d.value), Some(1));

        assert_eq!(outcomes[5].written, vec!["01010801".to_string()]);
        let named = &outcomes[6].updates[0];
        assert_eq!(named.zone(1).and_then(|z| z.name.as_deref()), Some("Kitchen"));

        assert_eq!(outcomes[7].written.len(), 1);
        assert_eq!(outcomes[8].state, DispatcherState::Idle);
        assert!(outcomes.iter().all(|o| o.errors.is_empty() && o.rejected.is_none()));
        assert!(replay.dispatcher().zones().is_empty());
    }

    #[test]
    fn test_rejected_and_bad_hex() {
        let mut replay = Replay::new(EngineConfig::default());
        replay.run_step(1, &Step::RequestDeviceList).unwrap();
        let busy = replay.run_step(2, &Step::RequestDeviceList).unwrap();
        assert!(busy.rejected.is_some());
        assert!(busy.written.is_empty());

        let err = replay.run_step(3, &Step::Notify("xyz".to_string())).unwrap_err();
        assert!(matches!(err, ReplayError::Hex { step: 3, .. }));
    }

    #[test]
    fn test_outcome_serializes() {
        let mut replay = Replay::new(EngineConfig::default());
        let outcome = replay.run_step(1, &Step::Timeout).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["action"], "timeout");
    }
}
