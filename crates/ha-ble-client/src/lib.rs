//! Command dispatcher for the home-automation controller BLE link.
//!
//! This crate drives the protocol defined in `ha-ble-protocol` on top of
//! host-supplied collaborators: a [`Transport`] for outbound bytes, a
//! [`ResultSink`] for the decoded zone tree and a one-shot [`Timer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ha_ble_client::{Dispatcher, EngineConfig};
//!
//! let mut dispatcher = Dispatcher::new(EngineConfig::default(), transport, ui, timer);
//! dispatcher.request_device_list()?;
//!
//! // From the BLE notify callback:
//! dispatcher.on_notify(&bytes)?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod replay;
pub mod transport;

pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, DispatcherState};
pub use error::{ConfigError, DispatchError, DispatchResult};
pub use transport::{
    ErrorKind, ManualTimer, RecordingSink, RecordingTransport, ResultSink, Timer, Transport,
};
