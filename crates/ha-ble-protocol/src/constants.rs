//! Protocol constants
//!
//! These constants define the command groups, opcodes, record sizes and
//! device type codes used on the controller BLE link.

// ============================================================================
// Frame Layout
// ============================================================================

/// Size of the frame header (length, group, opcode).
pub const HEADER_SIZE: usize = 3;
/// Largest payload a single frame can carry (the length field is one byte).
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Position of the payload length byte.
pub const LEN_POS: usize = 0;
/// Position of the command group byte.
pub const GROUP_POS: usize = 1;
/// Position of the opcode byte.
pub const OPCODE_POS: usize = 2;

// ============================================================================
// Command Groups
// ============================================================================

/// Write / report a value.
pub const GROUP_SET: u8 = 0x00;
/// Request a value.
pub const GROUP_GET: u8 = 0x01;

// ============================================================================
// Opcodes
// ============================================================================

/// Value of a single device (request, control, or push notification).
pub const OP_DEV_VAL: u8 = 0x00;
/// Number of devices known to the controller.
pub const OP_NUM_OF_DEVS: u8 = 0x01;
/// Device records selected by an index mask.
pub const OP_DEV_WITH_INDEX: u8 = 0x02;
/// Number of scenes.
pub const OP_NUM_OF_SCENES: u8 = 0x03;
/// Active scene with index.
pub const OP_ACT_SCENE_WITH_INDEX: u8 = 0x04;
/// Inactive scene with index.
pub const OP_INACT_SCENE_WITH_INDEX: u8 = 0x05;
/// Number of rules.
pub const OP_NUM_OF_RULES: u8 = 0x06;
/// Rule with index.
pub const OP_RULE_WITH_INDEX: u8 = 0x07;
/// Name of a zone.
pub const OP_ZONE_NAME: u8 = 0x08;

// ============================================================================
// Payload Layout
// ============================================================================

/// Size of one record in a device list: index (4) + id (4) + value (2).
pub const DEVICE_RECORD_SIZE: usize = 10;
/// Size of a `DEV_VAL` payload: id (4) + value (2).
pub const DEVICE_VALUE_SIZE: usize = 6;
/// Offset of the device count within a `NUM_OF_DEVS` response.
pub const DEVICE_COUNT_POS: usize = 2;
/// Index mask selecting every device in a `DEV_WITH_INDEX` request.
pub const ALL_DEVICES_MASK: u32 = 0xFFFF_FFFF;
/// Size of the name field in a `ZONE_NAME` response.
pub const ZONE_NAME_SIZE: usize = 16;

// ============================================================================
// Device Type Codes
// ============================================================================

/// Wall switch.
pub const DEV_TYPE_SWITCH: u8 = 0x01;
/// Push button.
pub const DEV_TYPE_BUTTON: u8 = 0x02;
/// Dimmer knob.
pub const DEV_TYPE_DIMMER: u8 = 0x03;
/// Linear (light) sensor, app numbering.
pub const DEV_TYPE_LINEAR_SENSOR: u8 = 0x04;
/// Event (gas) sensor, app numbering.
pub const DEV_TYPE_EVENT_SENSOR: u8 = 0x05;
/// ADC temperature sensor.
pub const DEV_TYPE_ADC_TEMP: u8 = 0x30;
/// ADC luminosity sensor.
pub const DEV_TYPE_ADC_LUMI: u8 = 0x31;
/// ADC gas sensor.
pub const DEV_TYPE_ADC_GAS: u8 = 0x32;
/// PIR motion sensor.
pub const DEV_TYPE_EVT_PIR: u8 = 0x38;
/// On/off bulb, app numbering.
pub const DEV_TYPE_ON_OFF_BULB: u8 = 0x41;
/// Level bulb.
pub const DEV_TYPE_LEVEL_BULB: u8 = 0x42;
/// RGB LED.
pub const DEV_TYPE_RGB_LED: u8 = 0x43;
/// SG90 servo motor.
pub const DEV_TYPE_SERVO_SG90: u8 = 0x44;
/// On/off output driving a bulb, firmware numbering.
pub const DEV_TYPE_ON_OFF_OUTPUT: u8 = 0x78;
