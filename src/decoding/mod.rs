//! Radio decoding input types and advertisement payload decoding.
//!
//! The transport layer delivers merged [`RadioDecoding`] records; the
//! [`PacketDecoder`] turns their raw payload bytes into named properties for
//! identity resolution and filtering.

pub mod decoder;
pub mod types;

// Re-export commonly used types
pub use decoder::{AdvertisementDecoder, DecodeError, PacketDecoder};
pub use types::{keys, DecodedProperties, PropertyValue, RadioDecoding, ReceiverSighting};
