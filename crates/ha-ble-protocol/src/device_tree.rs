//! Zone/device tree built from device-list payloads.

use serde::Serialize;

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// A group of devices sharing a zone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    /// Zone number taken from the device ids.
    pub id: u8,
    /// Name reported by `ZONE_NAME`, if any.
    pub name: Option<String>,
    /// Devices in first-seen order.
    pub devices: Vec<DeviceRecord>,
}

impl Zone {
    /// Create an unnamed, empty zone.
    pub fn new(id: u8) -> Self {
        Zone {
            id,
            name: None,
            devices: Vec::new(),
        }
    }

    /// Name to show in the UI: the reported name, or `"Zone N"`.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Zone {}", self.id),
        }
    }

    /// Find a device by id.
    pub fn device(&self, id: DeviceId) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Result of [`ZoneTree::upsert_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The device was not in the tree.
    Inserted,
    /// The device existed and its record changed.
    Updated,
    /// The device existed with an identical record.
    Unchanged,
}

/// Zones in first-seen order, each owning its devices.
///
/// A device id appears at most once across the whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneTree {
    zones: Vec<Zone>,
}

impl ZoneTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        ZoneTree { zones: Vec::new() }
    }

    /// Zones in first-seen order.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Look up a zone by number.
    pub fn zone(&self, id: u8) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    fn zone_mut(&mut self, id: u8) -> &mut Zone {
        match self.zones.iter().position(|z| z.id == id) {
            Some(pos) => &mut self.zones[pos],
            None => {
                self.zones.push(Zone::new(id));
                let last = self.zones.len() - 1;
                &mut self.zones[last]
            }
        }
    }

    /// Find a device anywhere in the tree.
    pub fn find_device(&self, id: DeviceId) -> Option<&DeviceRecord> {
        self.zones.iter().find_map(|z| z.device(id))
    }

    /// Insert a device into its zone, or overwrite the existing entry.
    ///
    /// The zone is taken from the id with `layout`; an existing entry is
    /// replaced in place so zone and device order are kept.
    pub fn upsert_device(&mut self, record: DeviceRecord, layout: IdLayout) -> UpsertOutcome {
        for zone in &mut self.zones {
            if let Some(existing) = zone.devices.iter_mut().find(|d| d.id == record.id) {
                if *existing == record {
                    return UpsertOutcome::Unchanged;
                }
                *existing = record;
                return UpsertOutcome::Updated;
            }
        }

        self.zone_mut(record.id.zone(layout)).devices.push(record);
        UpsertOutcome::Inserted
    }

    /// Update only the value of a known device.
    ///
    /// Returns `None` if the device is not in the tree.
    pub fn update_value(&mut self, id: DeviceId, value: i16) -> Option<UpsertOutcome> {
        let device = self
            .zones
            .iter_mut()
            .flat_map(|z| z.devices.iter_mut())
            .find(|d| d.id == id)?;

        if device.value == value {
            Some(UpsertOutcome::Unchanged)
        } else {
            device.value = value;
            Some(UpsertOutcome::Updated)
        }
    }

    /// Merge every device of `other` into this tree. Zone names reported in
    /// `other` win over existing ones.
    pub fn merge(&mut self, other: ZoneTree, layout: IdLayout) {
        for zone in other.zones {
            if zone.name.is_some() {
                self.zone_mut(zone.id).name = zone.name;
            }
            for device in zone.devices {
                self.upsert_device(device, layout);
            }
        }
    }

    /// Set the name of an existing zone. Returns false if the zone is unknown.
    pub fn set_zone_name(&mut self, id: u8, name: impl Into<String>) -> bool {
        match self.zones.iter_mut().find(|z| z.id == id) {
            Some(zone) => {
                zone.name = Some(name.into());
                true
            }
            None => false,
        }
    }

    /// Total number of devices across all zones.
    pub fn device_count(&self) -> usize {
        self.zones.iter().map(|z| z.devices.len()).sum()
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether the tree has no zones.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Remove every zone.
    pub fn clear(&mut self) {
        self.zones.clear();
    }
}

/// Decode one 10-byte device record.
pub fn decode_device_record(bytes: &[u8], layout: IdLayout) -> ProtocolResult<DeviceRecord> {
    if bytes.len() < DEVICE_RECORD_SIZE {
        return Err(ProtocolError::PayloadTooShort {
            expected: DEVICE_RECORD_SIZE,
            actual: bytes.len(),
        });
    }

    let index = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let id = DeviceId(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]));
    let value = i16::from_be_bytes([bytes[8], bytes[9]]);

    Ok(DeviceRecord::new(index, id, value, layout))
}

/// Decode a flattened `DEV_WITH_INDEX` payload into a zone tree.
///
/// The payload must be a whole number of records; anything else is
/// [`ProtocolError::MalformedPayload`] and nothing is decoded. A device id
/// repeated in the payload keeps its first position and its last record.
pub fn decode_device_list(payload: &[u8], layout: IdLayout) -> ProtocolResult<ZoneTree> {
    if payload.len() % DEVICE_RECORD_SIZE != 0 {
        return Err(ProtocolError::MalformedPayload {
            len: payload.len(),
            record_size: DEVICE_RECORD_SIZE,
        });
    }

    let mut tree = ZoneTree::new();
    for chunk in payload.chunks_exact(DEVICE_RECORD_SIZE) {
        let record = decode_device_record(chunk, layout)?;
        tree.upsert_device(record, layout);
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record_bytes(index: u32, id: u32, value: i16) -> Vec<u8> {
        let mut out = Vec::with_capacity(DEVICE_RECORD_SIZE);
        out.extend_from_slice(&index.to_be_bytes());
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    #[test]
    fn test_decode_record() {
        let bytes = record_bytes(3, 0x0102_0303, -5);
        let rec = decode_device_record(&bytes, IdLayout::ZoneMajor).unwrap();
        assert_eq!(rec.index, 3);
        assert_eq!(rec.id, DeviceId(0x0102_0303));
        assert_eq!(rec.value, -5);
        assert_eq!(rec.type_code, DEV_TYPE_DIMMER);

        assert_eq!(
            decode_device_record(&bytes[..9], IdLayout::ZoneMajor).unwrap_err(),
            ProtocolError::PayloadTooShort {
                expected: 10,
                actual: 9
            }
        );
    }

    /// Two records: a dimmer at 2 and an on/off bulb at 0.
    fn two_device_payload() -> Vec<u8> {
        let mut payload = record_bytes(0, 0x0000_0003, 2);
        payload.extend(record_bytes(0, 0x0100_0041, 0));
        payload
    }

    #[test]
    fn test_decode_list_zone_in_endpoint_byte() {
        let tree = decode_device_list(&two_device_payload(), IdLayout::ZoneInEndpointByte).unwrap();

        // Both ids carry zone 0 in the third byte.
        assert_eq!(tree.len(), 1);
        let zone = &tree.zones()[0];
        assert_eq!(zone.id, 0);
        assert_eq!(zone.devices.len(), 2);
        assert_eq!(zone.devices[0].type_code, 0x03);
        assert_eq!(zone.devices[0].value, 2);
        assert_eq!(zone.devices[1].type_code, 0x41);
        assert_eq!(zone.devices[1].display_kind(), DisplayKind::OnOffBulb);
    }

    #[test]
    fn test_decode_list_zone_major() {
        let tree = decode_device_list(&two_device_payload(), IdLayout::ZoneMajor).unwrap();

        // The bulb's first byte is 0x01, so it lands in its own zone.
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.zones()[0].id, 0);
        assert_eq!(tree.zones()[0].devices[0].type_code, 0x03);
        assert_eq!(tree.zones()[1].id, 1);
        assert_eq!(tree.zones()[1].devices[0].type_code, 0x41);
        assert_eq!(tree.device_count(), 2);
    }

    #[test]
    fn test_decode_list_rejects_partial_record() {
        let mut payload = two_device_payload();
        payload.pop();
        assert_eq!(
            decode_device_list(&payload, IdLayout::ZoneMajor).unwrap_err(),
            ProtocolError::MalformedPayload {
                len: 19,
                record_size: 10
            }
        );
    }

    #[test]
    fn test_decode_empty_list() {
        let tree = decode_device_list(&[], IdLayout::ZoneMajor).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.device_count(), 0);
    }

    #[test]
    fn test_duplicate_id_keeps_single_entry() {
        let mut payload = record_bytes(0, 0x0200_0041, 0);
        payload.extend(record_bytes(1, 0x0200_0042, 1));
        payload.extend(record_bytes(0, 0x0200_0041, 1));
        let tree = decode_device_list(&payload, IdLayout::ZoneMajor).unwrap();

        assert_eq!(tree.device_count(), 2);
        let zone = tree.zone(2).unwrap();
        assert_eq!(zone.devices[0].id, DeviceId(0x0200_0041));
        assert_eq!(zone.devices[0].value, 1);
    }

    #[test]
    fn test_upsert_outcomes() {
        let layout = IdLayout::ZoneMajor;
        let mut tree = ZoneTree::new();
        let rec = DeviceRecord::new(0, DeviceId(0x0300_0001), 0, layout);

        assert_eq!(tree.upsert_device(rec, layout), UpsertOutcome::Inserted);
        assert_eq!(tree.upsert_device(rec, layout), UpsertOutcome::Unchanged);
        let on = DeviceRecord { value: 1, ..rec };
        assert_eq!(tree.upsert_device(on, layout), UpsertOutcome::Updated);
        assert_eq!(tree.find_device(rec.id).unwrap().value, 1);
        assert_eq!(tree.device_count(), 1);
    }

    #[test]
    fn test_update_value() {
        let layout = IdLayout::ZoneMajor;
        let mut tree = ZoneTree::new();
        let id = DeviceId(0x0000_0042);
        tree.upsert_device(DeviceRecord::new(0, id, 0, layout), layout);

        assert_eq!(tree.update_value(id, 1), Some(UpsertOutcome::Updated));
        assert_eq!(tree.update_value(id, 1), Some(UpsertOutcome::Unchanged));
        assert_eq!(tree.update_value(DeviceId(9), 1), None);
    }

    #[test]
    fn test_merge_keeps_order_and_names() {
        let layout = IdLayout::ZoneMajor;
        let mut tree = decode_device_list(&record_bytes(0, 0x0100_0001, 0), layout).unwrap();
        tree.set_zone_name(1, "Kitchen");

        let mut incoming = record_bytes(0, 0x0100_0001, 1);
        incoming.extend(record_bytes(1, 0x0200_0030, 21));
        let incoming = decode_device_list(&incoming, layout).unwrap();

        tree.merge(incoming, layout);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.zones()[0].display_name(), "Kitchen");
        assert_eq!(tree.zones()[1].display_name(), "Zone 2");
        assert_eq!(tree.find_device(DeviceId(0x0100_0001)).unwrap().value, 1);
        assert_eq!(tree.device_count(), 2);
    }

    #[test]
    fn test_set_zone_name_unknown_zone() {
        let mut tree = ZoneTree::new();
        assert!(!tree.set_zone_name(4, "Garage"));
        assert!(tree.is_empty());
    }

    proptest! {
        #[test]
        fn prop_partial_records_are_malformed(
            payload in proptest::collection::vec(any::<u8>(), 0..200),
        ) {
            let result = decode_device_list(&payload, IdLayout::ZoneMajor);
            if payload.len() % DEVICE_RECORD_SIZE == 0 {
                let tree = result.unwrap();
                prop_assert!(tree.device_count() <= payload.len() / DEVICE_RECORD_SIZE);
            } else {
                let is_malformed = matches!(result, Err(ProtocolError::MalformedPayload { .. }));
                prop_assert!(is_malformed);
            }
        }
    }
}
