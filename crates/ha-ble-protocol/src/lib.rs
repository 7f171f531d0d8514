//! Home-automation controller BLE protocol
//!
//! This crate provides types and utilities for talking to the home-automation
//! central controller over a Bluetooth Low Energy characteristic. Every
//! message is a small frame with a three byte header followed by a payload.
//!
//! # Protocol Overview
//!
//! ```text
//! +--------+-------+--------+-------------------------+
//! | length | group | opcode | payload[0..length]      |
//! +--------+-------+--------+-------------------------+
//! ```
//!
//! - **Requests** (phone → controller): `GET` frames asking for the device
//!   count, the device list or a zone name, and `SET DEV_VAL` frames that
//!   change a device's value.
//! - **Responses** (controller → phone): frames carrying the same opcode as
//!   the request. A device list may span several frames, which are collected
//!   in a [`MessageQueue`] until [`MessageQueue::check_ready`] passes.
//! - **Push notifications** (controller → phone): unsolicited `DEV_VAL`
//!   frames reporting a single device's new value.
//!
//! # Example
//!
//! ```rust,ignore
//! use ha_ble_protocol::{Command, Frame, IdLayout, decode_device_list};
//!
//! // Build a request
//! let bytes = Command::GetDeviceCount.encode();
//!
//! // Parse a notification and decode a device list
//! let frame = Frame::decode(&received)?;
//! let zones = decode_device_list(frame.payload(), IdLayout::ZoneMajor)?;
//! ```

mod commands;
mod constants;
mod device_tree;
mod error;
mod frame;
mod queue;
mod responses;
mod types;

pub use commands::*;
pub use constants::*;
pub use device_tree::*;
pub use error::*;
pub use frame::*;
pub use queue::*;
pub use responses::*;
pub use types::*;
