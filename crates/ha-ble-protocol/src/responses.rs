//! Responses and notifications from the controller.

use crate::constants::*;
use crate::device_tree::*;
use crate::error::*;
use crate::types::*;

/// A single device's new value, from a `DEV_VAL` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceUpdate {
    /// Device that changed.
    pub id: DeviceId,
    /// New value.
    pub value: i16,
    /// Decoded record, present only in the 10-byte form.
    pub record: Option<DeviceRecord>,
}

impl DeviceUpdate {
    /// Table index, when the controller sent one.
    pub fn index(&self) -> Option<u32> {
        self.record.map(|record| record.index)
    }

    /// Full record for inserting a device not yet in the tree.
    ///
    /// `layout` only applies to the short form, which carries no record.
    pub fn to_record(&self, layout: IdLayout) -> DeviceRecord {
        self.record
            .unwrap_or_else(|| DeviceRecord::new(0, self.id, self.value, layout))
    }
}

/// Decoded controller response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Number of devices known to the controller.
    DeviceCount(u32),

    /// Complete device list, grouped by zone.
    DeviceList(ZoneTree),

    /// Value of one device (reply or push).
    DeviceValue(DeviceUpdate),

    /// Name of a zone.
    ZoneName {
        /// Zone number.
        zone: u8,
        /// Name with NUL padding removed.
        name: String,
    },

    /// Opcode in the table that this engine does not act on.
    Unhandled(Opcode),
}

impl Response {
    /// Decode a complete (possibly flattened) payload carrying `command_id`.
    pub fn decode(command_id: u8, payload: &[u8], layout: IdLayout) -> ProtocolResult<Self> {
        let opcode = Opcode::from_u8(command_id).ok_or(ProtocolError::UnknownOpcode(command_id))?;

        match opcode {
            Opcode::NumOfDevs => {
                if payload.len() <= DEVICE_COUNT_POS {
                    return Err(ProtocolError::PayloadTooShort {
                        expected: DEVICE_COUNT_POS + 1,
                        actual: payload.len(),
                    });
                }
                Ok(Response::DeviceCount(payload[DEVICE_COUNT_POS] as u32))
            }

            Opcode::DevWithIndex => Ok(Response::DeviceList(decode_device_list(payload, layout)?)),

            Opcode::DevVal => Ok(Response::DeviceValue(decode_device_value(payload, layout)?)),

            Opcode::ZoneName => {
                if payload.is_empty() {
                    return Err(ProtocolError::PayloadTooShort {
                        expected: 1,
                        actual: 0,
                    });
                }
                let name_bytes = &payload[1..payload.len().min(1 + ZONE_NAME_SIZE)];
                let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
                Ok(Response::ZoneName {
                    zone: payload[0],
                    name: String::from_utf8_lossy(&name_bytes[..name_end]).to_string(),
                })
            }

            other => Ok(Response::Unhandled(other)),
        }
    }
}

/// Decode a `DEV_VAL` payload: `id | value` or a full device record.
fn decode_device_value(payload: &[u8], layout: IdLayout) -> ProtocolResult<DeviceUpdate> {
    match payload.len() {
        DEVICE_VALUE_SIZE => Ok(DeviceUpdate {
            id: DeviceId(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])),
            value: i16::from_be_bytes([payload[4], payload[5]]),
            record: None,
        }),
        DEVICE_RECORD_SIZE => {
            let record = decode_device_record(payload, layout)?;
            Ok(DeviceUpdate {
                id: record.id,
                value: record.value,
                record: Some(record),
            })
        }
        len => Err(ProtocolError::MalformedPayload {
            len,
            record_size: DEVICE_VALUE_SIZE,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_device_count() {
        let resp = Response::decode(OP_NUM_OF_DEVS, &[0xAA, 0xBB, 0x05], IdLayout::ZoneMajor).unwrap();
        assert_eq!(resp, Response::DeviceCount(5));

        assert_eq!(
            Response::decode(OP_NUM_OF_DEVS, &[0x00, 0x00], IdLayout::ZoneMajor).unwrap_err(),
            ProtocolError::PayloadTooShort {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_decode_device_value_short_form() {
        let payload = [0x01, 0x00, 0x00, 0x41, 0x00, 0x01];
        let resp = Response::decode(OP_DEV_VAL, &payload, IdLayout::ZoneMajor).unwrap();
        assert_eq!(
            resp,
            Response::DeviceValue(DeviceUpdate {
                id: DeviceId(0x0100_0041),
                value: 1,
                record: None,
            })
        );
    }

    #[test]
    fn test_decode_device_value_record_form() {
        let payload = [0, 0, 0, 4, 0x02, 0x00, 0x00, 0x03, 0x00, 0x32];
        let Response::DeviceValue(update) =
            Response::decode(OP_DEV_VAL, &payload, IdLayout::ZoneMajor).unwrap()
        else {
            panic!("expected device value");
        };
        assert_eq!(update.index(), Some(4));
        assert_eq!(update.value, 50);

        let rec = update.to_record(IdLayout::ZoneMajor);
        assert_eq!(rec.display_kind(), DisplayKind::Dimmer);
    }

    #[test]
    fn test_decode_device_value_record_uses_layout() {
        let payload = [0, 0, 0, 7, 0x05, 0x00, 0x01, 0x02, 0x00, 0x10];
        let Response::DeviceValue(update) =
            Response::decode(OP_DEV_VAL, &payload, IdLayout::ZoneInEndpointByte).unwrap()
        else {
            panic!("expected device value");
        };
        let record = update.record.unwrap();
        assert_eq!(
            record,
            decode_device_record(&payload, IdLayout::ZoneInEndpointByte).unwrap()
        );

        // The decoded record wins over the layout passed at insert time.
        assert_eq!(update.to_record(IdLayout::ZoneMajor), record);
    }

    #[test]
    fn test_decode_device_value_bad_length() {
        assert_eq!(
            Response::decode(OP_DEV_VAL, &[0; 7], IdLayout::ZoneMajor).unwrap_err(),
            ProtocolError::MalformedPayload {
                len: 7,
                record_size: 6
            }
        );
    }

    #[test]
    fn test_decode_zone_name() {
        let mut payload = vec![0x02];
        payload.extend_from_slice(b"Kitchen\0\0\0\0\0\0\0\0\0");
        let resp = Response::decode(OP_ZONE_NAME, &payload, IdLayout::ZoneMajor).unwrap();
        assert_eq!(
            resp,
            Response::ZoneName {
                zone: 2,
                name: "Kitchen".to_string()
            }
        );

        // Unpadded names and overlong fields are both accepted.
        let mut payload = vec![0x01];
        payload.extend_from_slice(b"A very long zone name");
        let Response::ZoneName { name, .. } =
            Response::decode(OP_ZONE_NAME, &payload, IdLayout::ZoneMajor).unwrap()
        else {
            panic!("expected zone name");
        };
        assert_eq!(name.len(), ZONE_NAME_SIZE);
    }

    #[test]
    fn test_decode_malformed_list() {
        assert!(matches!(
            Response::decode(OP_DEV_WITH_INDEX, &[0; 15], IdLayout::ZoneMajor),
            Err(ProtocolError::MalformedPayload { len: 15, .. })
        ));
    }

    #[test]
    fn test_decode_unhandled_and_unknown() {
        assert_eq!(
            Response::decode(OP_NUM_OF_SCENES, &[1], IdLayout::ZoneMajor).unwrap(),
            Response::Unhandled(Opcode::NumOfScenes)
        );
        assert_eq!(
            Response::decode(0x42, &[], IdLayout::ZoneMajor).unwrap_err(),
            ProtocolError::UnknownOpcode(0x42)
        );
    }
}
