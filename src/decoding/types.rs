//! Radio decoding input types and decoded-property containers.
//!
//! A [`RadioDecoding`] is one reported sighting of a broadcasting device,
//! already merged across the receivers that heard it. Field names on the wire
//! (`transmitterSignature`, `rssiSignature`, ...) are a compatibility
//! contract with upstream transports and must not change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One receiver's view of a broadcast within a decoding record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverSighting {
    /// Identifier of the receiver that heard the transmission
    pub receiver_id: String,
    /// Identifier type code of the receiver
    pub receiver_id_type: u8,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Number of raw decodings merged into this sighting
    pub number_of_decodings: u32,
}

impl ReceiverSighting {
    pub fn new(receiver_id: impl Into<String>, receiver_id_type: u8, rssi: i16) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            receiver_id_type,
            rssi,
            number_of_decodings: 1,
        }
    }
}

/// A merged radio decoding delivered by the transport layer.
///
/// `rssi_signature` is ordered strongest-first: element 0 is the nearest
/// receiver. `packets` hold the raw advertisement payloads, hex-encoded on
/// the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioDecoding {
    /// Stable key for one physical broadcast address + type
    pub transmitter_signature: String,
    /// Receivers that heard this broadcast, strongest-first
    #[serde(default)]
    pub rssi_signature: Vec<ReceiverSighting>,
    /// Raw advertisement payloads (hex strings on the wire)
    #[serde(default, with = "hex_packets")]
    pub packets: Vec<Vec<u8>>,
    /// Timestamp of the first observation in this record (epoch ms)
    pub initial_time: u64,
}

impl RadioDecoding {
    /// The nearest (strongest) receiver sighting, if any receiver heard it.
    pub fn nearest(&self) -> Option<&ReceiverSighting> {
        self.rssi_signature.first()
    }
}

/// Well-known decoded property names.
pub mod keys {
    /// Ordered list of device identifiers extracted from the payload.
    pub const DEVICE_IDS: &str = "deviceIds";
    /// Ordered list of advertised service UUIDs.
    pub const UUIDS: &str = "uuids";
    /// Advertised local name.
    pub const NAME: &str = "name";
}

/// A decoded property value: scalar text or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

/// Named properties produced by the payload decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedProperties {
    /// Property name to decoded value
    #[serde(flatten)]
    pub values: HashMap<String, PropertyValue>,
}

impl DecodedProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar text property, replacing any previous value.
    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), PropertyValue::Text(value.into()));
    }

    /// Append a value to a list property, creating the list if absent.
    pub fn push_list(&mut self, key: &str, value: impl Into<String>) {
        match self
            .values
            .entry(key.to_string())
            .or_insert_with(|| PropertyValue::List(Vec::new()))
        {
            PropertyValue::List(items) => items.push(value.into()),
            // A scalar under the same name is replaced by a fresh list.
            slot => *slot = PropertyValue::List(vec![value.into()]),
        }
    }

    /// Get a list-valued property; absent or scalar yields an empty slice.
    pub fn list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(PropertyValue::List(items)) => items,
            _ => &[],
        }
    }

    /// Get a scalar text property.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(PropertyValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Decoded device identifiers, in the order they were decoded.
    pub fn device_ids(&self) -> &[String] {
        self.list(keys::DEVICE_IDS)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Serde support for hex-encoded packet payloads.
mod hex_packets {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(packets: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: Vec<String> = packets.iter().map(hex::encode).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|s| hex::decode(&s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raddec_wire_format() {
        let json = r#"{
            "transmitterSignature": "aabbccddeeff/2",
            "rssiSignature": [
                {"receiverId": "001bc50940810000", "receiverIdType": 1,
                 "rssi": -42, "numberOfDecodings": 3}
            ],
            "packets": ["0201060709576964676574"],
            "initialTime": 1000
        }"#;

        let raddec: RadioDecoding = serde_json::from_str(json).expect("valid raddec");
        assert_eq!(raddec.transmitter_signature, "aabbccddeeff/2");
        assert_eq!(raddec.nearest().unwrap().rssi, -42);
        assert_eq!(raddec.packets.len(), 1);
        assert_eq!(raddec.packets[0][0], 0x02);

        let round: serde_json::Value =
            serde_json::to_value(&raddec).expect("serializable raddec");
        assert_eq!(round["packets"][0], "0201060709576964676574");
        assert_eq!(round["rssiSignature"][0]["numberOfDecodings"], 3);
    }

    #[test]
    fn test_raddec_defaults_optional_fields() {
        let json = r#"{"transmitterSignature": "x/2", "initialTime": 5}"#;
        let raddec: RadioDecoding = serde_json::from_str(json).expect("minimal raddec");
        assert!(raddec.nearest().is_none());
        assert!(raddec.packets.is_empty());
    }

    #[test]
    fn test_property_accessors() {
        let mut props = DecodedProperties::new();
        assert!(props.is_empty());

        props.push_list(keys::DEVICE_IDS, "id-a");
        props.push_list(keys::DEVICE_IDS, "id-b");
        props.set_text(keys::NAME, "Widget");

        assert_eq!(props.device_ids(), ["id-a", "id-b"]);
        assert_eq!(props.text(keys::NAME), Some("Widget"));
        assert!(props.list("missing").is_empty());
        assert!(props.text(keys::DEVICE_IDS).is_none());
    }
}
