//! Common types used in the protocol.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Command group carried in the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandGroup {
    /// Write or report a value.
    Set,
    /// Request a value.
    Get,
    /// Group byte outside the known set (kept so decoding never fails on it).
    Other(u8),
}

impl From<u8> for CommandGroup {
    fn from(value: u8) -> Self {
        match value {
            GROUP_SET => CommandGroup::Set,
            GROUP_GET => CommandGroup::Get,
            _ => CommandGroup::Other(value),
        }
    }
}

impl From<CommandGroup> for u8 {
    fn from(value: CommandGroup) -> Self {
        match value {
            CommandGroup::Set => GROUP_SET,
            CommandGroup::Get => GROUP_GET,
            CommandGroup::Other(v) => v,
        }
    }
}

/// Opcodes understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Single device value.
    DevVal,
    /// Device count.
    NumOfDevs,
    /// Device records by index.
    DevWithIndex,
    /// Scene count.
    NumOfScenes,
    /// Active scene by index.
    ActSceneWithIndex,
    /// Inactive scene by index.
    InactSceneWithIndex,
    /// Rule count.
    NumOfRules,
    /// Rule by index.
    RuleWithIndex,
    /// Zone name.
    ZoneName,
}

impl Opcode {
    /// Look up an opcode byte. Returns None for bytes outside the table.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            OP_DEV_VAL => Opcode::DevVal,
            OP_NUM_OF_DEVS => Opcode::NumOfDevs,
            OP_DEV_WITH_INDEX => Opcode::DevWithIndex,
            OP_NUM_OF_SCENES => Opcode::NumOfScenes,
            OP_ACT_SCENE_WITH_INDEX => Opcode::ActSceneWithIndex,
            OP_INACT_SCENE_WITH_INDEX => Opcode::InactSceneWithIndex,
            OP_NUM_OF_RULES => Opcode::NumOfRules,
            OP_RULE_WITH_INDEX => Opcode::RuleWithIndex,
            OP_ZONE_NAME => Opcode::ZoneName,
            _ => return None,
        })
    }

    /// The wire byte for this opcode.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::DevVal => OP_DEV_VAL,
            Opcode::NumOfDevs => OP_NUM_OF_DEVS,
            Opcode::DevWithIndex => OP_DEV_WITH_INDEX,
            Opcode::NumOfScenes => OP_NUM_OF_SCENES,
            Opcode::ActSceneWithIndex => OP_ACT_SCENE_WITH_INDEX,
            Opcode::InactSceneWithIndex => OP_INACT_SCENE_WITH_INDEX,
            Opcode::NumOfRules => OP_NUM_OF_RULES,
            Opcode::RuleWithIndex => OP_RULE_WITH_INDEX,
            Opcode::ZoneName => OP_ZONE_NAME,
        }
    }

    /// Protocol name, used in logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::DevVal => "DEV_VAL",
            Opcode::NumOfDevs => "NUM_OF_DEVS",
            Opcode::DevWithIndex => "DEV_WITH_INDEX",
            Opcode::NumOfScenes => "NUM_OF_SCENES",
            Opcode::ActSceneWithIndex => "ACT_SCENE_WITH_INDEX",
            Opcode::InactSceneWithIndex => "INACT_SCENE_WITH_INDEX",
            Opcode::NumOfRules => "NUM_OF_RULES",
            Opcode::RuleWithIndex => "RULE_WITH_INDEX",
            Opcode::ZoneName => "ZONE_NAME",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which byte of a packed device id holds which field.
///
/// Two controller revisions disagree on where the zone lives, so the layout
/// is configuration rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdLayout {
    /// `zone | node | endpoint | type`, most significant byte first.
    #[default]
    ZoneMajor,
    /// `endpoint | node | zone | type`, most significant byte first.
    ZoneInEndpointByte,
}

impl IdLayout {
    /// Byte positions (big-endian) of zone, node, endpoint and type.
    const fn positions(self) -> (usize, usize, usize, usize) {
        match self {
            IdLayout::ZoneMajor => (0, 1, 2, 3),
            IdLayout::ZoneInEndpointByte => (2, 1, 0, 3),
        }
    }
}

/// Packed 4-byte device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Pack the individual fields according to `layout`.
    pub fn from_parts(layout: IdLayout, zone: u8, node: u8, endpoint: u8, type_code: u8) -> Self {
        let (z, n, e, t) = layout.positions();
        let mut bytes = [0u8; 4];
        bytes[z] = zone;
        bytes[n] = node;
        bytes[e] = endpoint;
        bytes[t] = type_code;
        DeviceId(u32::from_be_bytes(bytes))
    }

    /// Big-endian bytes as carried on the wire.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Zone number.
    pub fn zone(self, layout: IdLayout) -> u8 {
        self.to_be_bytes()[layout.positions().0]
    }

    /// Node number within the zone.
    pub fn node(self, layout: IdLayout) -> u8 {
        self.to_be_bytes()[layout.positions().1]
    }

    /// Endpoint / device-type family.
    pub fn endpoint(self, layout: IdLayout) -> u8 {
        self.to_be_bytes()[layout.positions().2]
    }

    /// Device type code.
    pub fn type_code(self, layout: IdLayout) -> u8 {
        self.to_be_bytes()[layout.positions().3]
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(value: u32) -> Self {
        DeviceId(value)
    }
}

/// What a device can do in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// On/off toggle. Read-only toggles mirror input devices.
    Toggle {
        /// Whether the user may flip it.
        read_only: bool,
    },
    /// Slider over an inclusive range.
    Range {
        /// Lowest value.
        min: i16,
        /// Highest value.
        max: i16,
    },
    /// Numeric sensor readout.
    Readout,
    /// Colour picker.
    Color,
    /// Nothing to show beyond the name.
    None,
}

/// Presentation kind selected by the device type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    /// Wall switch.
    Switch,
    /// Push button.
    Button,
    /// Dimmer.
    Dimmer,
    /// Level bulb.
    LevelBulb,
    /// On/off bulb.
    OnOffBulb,
    /// RGB LED.
    RgbLed,
    /// Temperature sensor.
    TemperatureSensor,
    /// Light sensor.
    LightSensor,
    /// Gas sensor.
    GasSensor,
    /// PIR motion sensor.
    PirSensor,
    /// Servo motor.
    Servo,
    /// Unrecognised type code.
    Unknown,
}

impl DisplayKind {
    /// Map a device type code to its display kind.
    pub fn from_type_code(code: u8) -> Self {
        match code {
            DEV_TYPE_SWITCH => DisplayKind::Switch,
            DEV_TYPE_BUTTON => DisplayKind::Button,
            DEV_TYPE_DIMMER => DisplayKind::Dimmer,
            DEV_TYPE_LINEAR_SENSOR | DEV_TYPE_ADC_LUMI => DisplayKind::LightSensor,
            DEV_TYPE_EVENT_SENSOR | DEV_TYPE_ADC_GAS => DisplayKind::GasSensor,
            DEV_TYPE_ADC_TEMP => DisplayKind::TemperatureSensor,
            DEV_TYPE_EVT_PIR => DisplayKind::PirSensor,
            DEV_TYPE_ON_OFF_BULB | DEV_TYPE_ON_OFF_OUTPUT => DisplayKind::OnOffBulb,
            DEV_TYPE_LEVEL_BULB => DisplayKind::LevelBulb,
            DEV_TYPE_RGB_LED => DisplayKind::RgbLed,
            DEV_TYPE_SERVO_SG90 => DisplayKind::Servo,
            _ => DisplayKind::Unknown,
        }
    }

    /// Capability set the UI should expose.
    pub fn capability(self) -> Capability {
        match self {
            DisplayKind::Switch | DisplayKind::OnOffBulb | DisplayKind::LevelBulb => {
                Capability::Toggle { read_only: false }
            }
            DisplayKind::Button => Capability::Toggle { read_only: true },
            DisplayKind::Dimmer => Capability::Range { min: 0, max: 100 },
            DisplayKind::Servo => Capability::Range { min: 0, max: 180 },
            DisplayKind::TemperatureSensor
            | DisplayKind::LightSensor
            | DisplayKind::GasSensor
            | DisplayKind::PirSensor => Capability::Readout,
            DisplayKind::RgbLed => Capability::Color,
            DisplayKind::Unknown => Capability::None,
        }
    }

    /// Human-readable device name.
    pub fn label(self) -> &'static str {
        match self {
            DisplayKind::Switch => "Switch",
            DisplayKind::Button => "Button",
            DisplayKind::Dimmer => "Dimmer",
            DisplayKind::LevelBulb => "Level Bulb",
            DisplayKind::OnOffBulb => "ON/OFF Bulb",
            DisplayKind::RgbLed => "RGB Led",
            DisplayKind::TemperatureSensor => "Temperature Sensor",
            DisplayKind::LightSensor => "Light Sensor",
            DisplayKind::GasSensor => "Gas Sensor",
            DisplayKind::PirSensor => "PIR Sensor",
            DisplayKind::Servo => "Servo SG90",
            DisplayKind::Unknown => "Unknown Device",
        }
    }
}

/// One controlled or sensed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    /// Position in the controller's device table.
    pub index: u32,
    /// Packed identifier.
    pub id: DeviceId,
    /// Current reading or state; meaning depends on the type code.
    pub value: i16,
    /// Type code extracted from `id` when the record was decoded.
    pub type_code: u8,
}

impl DeviceRecord {
    /// Build a record, extracting the type code with `layout`.
    pub fn new(index: u32, id: DeviceId, value: i16, layout: IdLayout) -> Self {
        DeviceRecord {
            index,
            id,
            value,
            type_code: id.type_code(layout),
        }
    }

    /// Display kind for this device.
    pub fn display_kind(&self) -> DisplayKind {
        DisplayKind::from_type_code(self.type_code)
    }

    /// Whether a toggle-style device is currently on.
    pub fn is_on(&self) -> bool {
        self.value != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_group_roundtrip() {
        assert_eq!(CommandGroup::from(0x00), CommandGroup::Set);
        assert_eq!(CommandGroup::from(0x01), CommandGroup::Get);
        assert_eq!(CommandGroup::from(0x7F), CommandGroup::Other(0x7F));
        assert_eq!(u8::from(CommandGroup::Get), 0x01);
        assert_eq!(u8::from(CommandGroup::Other(9)), 9);
    }

    #[test]
    fn test_opcode_table() {
        for byte in 0x00..=0x08 {
            let op = Opcode::from_u8(byte).expect("opcode in table");
            assert_eq!(op.as_u8(), byte);
        }
        assert_eq!(Opcode::from_u8(0x09), None);
        assert_eq!(Opcode::DevWithIndex.to_string(), "DEV_WITH_INDEX");
    }

    #[test]
    fn test_device_id_zone_major() {
        let id = DeviceId(0x0102_0342);
        assert_eq!(id.zone(IdLayout::ZoneMajor), 0x01);
        assert_eq!(id.node(IdLayout::ZoneMajor), 0x02);
        assert_eq!(id.endpoint(IdLayout::ZoneMajor), 0x03);
        assert_eq!(id.type_code(IdLayout::ZoneMajor), DEV_TYPE_LEVEL_BULB);
    }

    #[test]
    fn test_device_id_zone_in_endpoint_byte() {
        let id = DeviceId(0x0000_0144);
        assert_eq!(id.zone(IdLayout::ZoneInEndpointByte), 0x01);
        assert_eq!(id.type_code(IdLayout::ZoneInEndpointByte), DEV_TYPE_SERVO_SG90);
        assert_eq!(id.zone(IdLayout::ZoneMajor), 0x00);
    }

    #[test]
    fn test_device_id_from_parts() {
        let id = DeviceId::from_parts(IdLayout::ZoneMajor, 2, 0, 0, DEV_TYPE_RGB_LED);
        assert_eq!(id, DeviceId(0x0200_0043));
        let id = DeviceId::from_parts(IdLayout::ZoneInEndpointByte, 2, 0, 0, DEV_TYPE_RGB_LED);
        assert_eq!(id, DeviceId(0x0000_0243));
    }

    #[test]
    fn test_display_kind_mapping() {
        assert_eq!(DisplayKind::from_type_code(0x03), DisplayKind::Dimmer);
        assert_eq!(DisplayKind::from_type_code(0x41), DisplayKind::OnOffBulb);
        assert_eq!(DisplayKind::from_type_code(0x78), DisplayKind::OnOffBulb);
        assert_eq!(DisplayKind::from_type_code(0x30), DisplayKind::TemperatureSensor);
        assert_eq!(DisplayKind::from_type_code(0x38), DisplayKind::PirSensor);
        assert_eq!(DisplayKind::from_type_code(0xEE), DisplayKind::Unknown);
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(
            DisplayKind::Servo.capability(),
            Capability::Range { min: 0, max: 180 }
        );
        assert_eq!(
            DisplayKind::Dimmer.capability(),
            Capability::Range { min: 0, max: 100 }
        );
        assert_eq!(
            DisplayKind::Button.capability(),
            Capability::Toggle { read_only: true }
        );
        assert_eq!(DisplayKind::RgbLed.capability(), Capability::Color);
        assert_eq!(DisplayKind::Unknown.capability(), Capability::None);
    }

    #[test]
    fn test_device_record_type_code_follows_layout() {
        let id = DeviceId(0x0100_0041);
        let rec = DeviceRecord::new(7, id, 1, IdLayout::ZoneMajor);
        assert_eq!(rec.type_code, 0x41);
        assert_eq!(rec.display_kind(), DisplayKind::OnOffBulb);
        assert!(rec.is_on());
    }
}
