//! Advertisement payload decoding.
//!
//! The decoder turns raw advertisement bytes into named properties. It is an
//! external collaborator from the state machine's point of view: decoding may
//! fail, and a failure must degrade to "no properties available" rather than
//! abort event processing. That contract lives in the resolver; here decoding
//! is an ordinary fallible operation.

use crate::decoding::types::{keys, DecodedProperties};

/// Errors from parsing advertisement payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// An AD structure's declared length runs past the end of the packet.
    Truncated { offset: usize },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated { offset } => {
                write!(f, "AD structure at byte {offset} runs past end of packet")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes raw advertisement packets into named properties.
pub trait PacketDecoder: Send {
    fn decode(&self, packets: &[Vec<u8>]) -> Result<DecodedProperties, DecodeError>;
}

// AD types we extract properties from.
const AD_SHORTENED_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;
const AD_UUID16_INCOMPLETE: u8 = 0x02;
const AD_UUID16_COMPLETE: u8 = 0x03;
const AD_UUID128_INCOMPLETE: u8 = 0x06;
const AD_UUID128_COMPLETE: u8 = 0x07;
const AD_SERVICE_DATA: u8 = 0x16;
const AD_MANUFACTURER_DATA: u8 = 0xff;

const EDDYSTONE_UUID: u16 = 0xfeaa;
const EDDYSTONE_FRAME_UID: u8 = 0x00;
const COMPANY_APPLE: u16 = 0x004c;
const IBEACON_TYPE: u8 = 0x02;
const IBEACON_LENGTH: u8 = 0x15;

/// Default decoder for BLE advertisement payloads.
///
/// Extracts local names, advertised service UUIDs, and stable device
/// identifiers from Eddystone-UID service data and iBeacon manufacturer
/// data. Unrecognized AD structures are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvertisementDecoder;

impl AdvertisementDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_packet(
        &self,
        packet: &[u8],
        props: &mut DecodedProperties,
    ) -> Result<(), DecodeError> {
        let mut offset = 0;
        while offset < packet.len() {
            let length = packet[offset] as usize;
            if length == 0 {
                // Zero-length structure: the rest of the PDU is padding.
                break;
            }

            let end = offset + 1 + length;
            if end > packet.len() {
                return Err(DecodeError::Truncated { offset });
            }

            let ad_type = packet[offset + 1];
            let data = &packet[offset + 2..end];
            self.decode_structure(ad_type, data, props);
            offset = end;
        }
        Ok(())
    }

    fn decode_structure(&self, ad_type: u8, data: &[u8], props: &mut DecodedProperties) {
        match ad_type {
            AD_SHORTENED_NAME | AD_COMPLETE_NAME => {
                props.set_text(keys::NAME, String::from_utf8_lossy(data).into_owned());
            }
            AD_UUID16_INCOMPLETE | AD_UUID16_COMPLETE => {
                for pair in data.chunks_exact(2) {
                    let uuid = u16::from_le_bytes([pair[0], pair[1]]);
                    props.push_list(keys::UUIDS, format!("{uuid:04x}"));
                }
            }
            AD_UUID128_INCOMPLETE | AD_UUID128_COMPLETE => {
                for chunk in data.chunks_exact(16) {
                    let mut big_endian: Vec<u8> = chunk.to_vec();
                    big_endian.reverse();
                    props.push_list(keys::UUIDS, hex::encode(big_endian));
                }
            }
            AD_SERVICE_DATA => self.decode_service_data(data, props),
            AD_MANUFACTURER_DATA => self.decode_manufacturer_data(data, props),
            _ => {}
        }
    }

    /// Service data: leading 16-bit service UUID, then service payload.
    fn decode_service_data(&self, data: &[u8], props: &mut DecodedProperties) {
        if data.len() < 2 {
            return;
        }
        let uuid = u16::from_le_bytes([data[0], data[1]]);
        props.push_list(keys::UUIDS, format!("{uuid:04x}"));

        // Eddystone-UID frame: type, tx power, 10-byte namespace, 6-byte instance.
        if uuid == EDDYSTONE_UUID && data.len() >= 20 && data[2] == EDDYSTONE_FRAME_UID {
            props.push_list(keys::DEVICE_IDS, hex::encode(&data[4..20]));
        }
    }

    /// Manufacturer data: leading 16-bit company id, then vendor payload.
    fn decode_manufacturer_data(&self, data: &[u8], props: &mut DecodedProperties) {
        if data.len() < 2 {
            return;
        }
        let company = u16::from_le_bytes([data[0], data[1]]);

        // iBeacon: proximity UUID, major, minor form the device identifier.
        if company == COMPANY_APPLE
            && data.len() >= 24
            && data[2] == IBEACON_TYPE
            && data[3] == IBEACON_LENGTH
        {
            props.push_list(keys::DEVICE_IDS, hex::encode(&data[4..24]));
        }
    }
}

impl PacketDecoder for AdvertisementDecoder {
    fn decode(&self, packets: &[Vec<u8>]) -> Result<DecodedProperties, DecodeError> {
        let mut props = DecodedProperties::new();
        for packet in packets {
            self.decode_packet(packet, &mut props)?;
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(packet: Vec<u8>) -> Result<DecodedProperties, DecodeError> {
        AdvertisementDecoder::new().decode(&[packet])
    }

    #[test]
    fn test_decode_complete_name() {
        let packet = vec![0x07, 0x09, b'W', b'i', b'd', b'g', b'e', b't'];
        let props = decode_one(packet).expect("decodable packet");
        assert_eq!(props.text(keys::NAME), Some("Widget"));
    }

    #[test]
    fn test_decode_uuid16_list() {
        // Battery (0x180f) and Device Information (0x180a), little-endian.
        let packet = vec![0x05, 0x03, 0x0f, 0x18, 0x0a, 0x18];
        let props = decode_one(packet).expect("decodable packet");
        assert_eq!(props.list(keys::UUIDS), ["180f", "180a"]);
    }

    #[test]
    fn test_decode_eddystone_uid_device_id() {
        let mut packet = vec![0x15, 0x16, 0xaa, 0xfe, 0x00, 0xf0];
        packet.extend([0x11; 10]); // namespace
        packet.extend([0x22; 6]); // instance
        let props = decode_one(packet).expect("decodable packet");

        assert_eq!(
            props.device_ids(),
            ["11111111111111111111222222222222"]
        );
        assert_eq!(props.list(keys::UUIDS), ["feaa"]);
    }

    #[test]
    fn test_decode_ibeacon_device_id() {
        let mut packet = vec![0x1a, 0xff, 0x4c, 0x00, 0x02, 0x15];
        packet.extend([0xab; 16]); // proximity UUID
        packet.extend([0x00, 0x01]); // major
        packet.extend([0x00, 0x02]); // minor
        packet.push(0xc5); // tx power
        let props = decode_one(packet).expect("decodable packet");

        assert_eq!(
            props.device_ids(),
            [format!("{}00010002", "ab".repeat(16))]
        );
    }

    #[test]
    fn test_decode_multiple_packets_accumulate() {
        let name = vec![0x02, 0x09, b'A'];
        let uuids = vec![0x03, 0x03, 0x0f, 0x18];
        let props = AdvertisementDecoder::new()
            .decode(&[name, uuids])
            .expect("decodable packets");
        assert_eq!(props.text(keys::NAME), Some("A"));
        assert_eq!(props.list(keys::UUIDS), ["180f"]);
    }

    #[test]
    fn test_truncated_structure_fails() {
        // Declares 5 data+type bytes but only 2 follow.
        let packet = vec![0x05, 0x09, b'A'];
        let err = decode_one(packet).expect_err("truncated packet");
        assert_eq!(err, DecodeError::Truncated { offset: 0 });
    }

    #[test]
    fn test_trailing_padding_is_not_an_error() {
        let packet = vec![0x02, 0x09, b'A', 0x00, 0x00, 0x00];
        let props = decode_one(packet).expect("padded packet");
        assert_eq!(props.text(keys::NAME), Some("A"));
    }

    #[test]
    fn test_unknown_structures_are_skipped() {
        // Flags (0x01) and tx power (0x0a) carry no properties we extract.
        let packet = vec![0x02, 0x01, 0x06, 0x02, 0x0a, 0xc5];
        let props = decode_one(packet).expect("decodable packet");
        assert!(props.is_empty());
    }
}
