//! Requests sent to the controller.

use crate::constants::*;
use crate::frame::Frame;
use crate::types::*;

/// Requests that can be sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask how many devices the controller knows. First request of a refresh.
    GetDeviceCount,

    /// Ask for the device records selected by an index mask.
    GetDevices {
        /// Index mask; [`ALL_DEVICES_MASK`] selects every device.
        index_mask: u32,
    },

    /// Change the value of a single device.
    SetDeviceValue {
        /// Target device.
        id: DeviceId,
        /// New value (on/off, level or angle depending on the device type).
        value: i16,
    },

    /// Ask for the name of a zone.
    GetZoneName {
        /// Zone number.
        zone: u8,
    },
}

impl Command {
    /// Request for the whole device list.
    pub fn get_all_devices() -> Self {
        Command::GetDevices {
            index_mask: ALL_DEVICES_MASK,
        }
    }

    /// Opcode carried by this command.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::GetDeviceCount => Opcode::NumOfDevs,
            Command::GetDevices { .. } => Opcode::DevWithIndex,
            Command::SetDeviceValue { .. } => Opcode::DevVal,
            Command::GetZoneName { .. } => Opcode::ZoneName,
        }
    }

    /// Command group carried by this command.
    pub fn group(&self) -> CommandGroup {
        match self {
            Command::SetDeviceValue { .. } => CommandGroup::Set,
            _ => CommandGroup::Get,
        }
    }

    /// Build the frame for this command.
    pub fn to_frame(&self) -> Frame {
        let group = self.group();
        let opcode = self.opcode();

        match *self {
            Command::GetDeviceCount => Frame::fixed(group, opcode, []),

            Command::GetDevices { index_mask } => {
                Frame::fixed(group, opcode, index_mask.to_be_bytes())
            }

            Command::SetDeviceValue { id, value } => {
                let mut payload = [0u8; DEVICE_VALUE_SIZE];
                payload[..4].copy_from_slice(&id.to_be_bytes());
                payload[4..].copy_from_slice(&value.to_be_bytes());
                Frame::fixed(group, opcode, payload)
            }

            Command::GetZoneName { zone } => Frame::fixed(group, opcode, [zone]),
        }
    }

    /// Encode the command to bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().encode()
    }
}
