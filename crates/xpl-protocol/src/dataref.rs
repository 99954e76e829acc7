//! Dataref subscription, publish, and value-update messages
//!
//! All three shapes share the same conventions: a 5-byte ASCII tag field,
//! little-endian integers and floats, and dataref names written as
//! NUL-terminated strings zero-padded to a fixed field width.
//!
//! # Format
//! - Subscribe/unsubscribe (client → simulator): `RREF\0` + i32 frequency +
//!   u32 index + 400-byte name field. Frequency 0 cancels the subscription.
//! - Publish (client → simulator): `DREF\0` + f32 value + 500-byte name
//!   field. Fire-and-forget; the protocol has no acknowledgment.
//! - Value update (simulator → client): `RREF,` + one or more back-to-back
//!   8-byte records of (u32 index, f32 value). A single datagram may batch
//!   any number of records.

use tracing::trace;

use crate::bytes::{f32_at, i32_at, u32_at};
use crate::error::ProtocolError;

/// Tag field on outbound subscribe/unsubscribe records
pub const RREF_REQUEST_TAG: &[u8; 5] = b"RREF\0";

/// Tag field on inbound value-update datagrams
///
/// The simulator replies with a comma where requests carry a NUL.
pub const RREF_REPLY_TAG: &[u8; 5] = b"RREF,";

/// Tag field on outbound publish records
pub const DREF_REQUEST_TAG: &[u8; 5] = b"DREF\0";

/// Width of the zero-padded name field in subscribe records
pub const SUBSCRIBE_NAME_LEN: usize = 400;

/// Width of the zero-padded name field in publish records
pub const PUBLISH_NAME_LEN: usize = 500;

/// Size of one (index, value) record in a value-update datagram
pub const UPDATE_RECORD_LEN: usize = 8;

const TAG_LEN: usize = 5;

/// Check that a dataref name fits a NUL-terminated field of `field_len` bytes
pub fn validate_name(name: &str, field_len: usize) -> Result<(), ProtocolError> {
    if name.len() >= field_len {
        return Err(ProtocolError::InvalidArgument(format!(
            "dataref name is {} bytes, field holds at most {}",
            name.len(),
            field_len - 1
        )));
    }
    if name.as_bytes().contains(&0) {
        return Err(ProtocolError::InvalidArgument(
            "dataref name contains a NUL byte".into(),
        ));
    }
    Ok(())
}

/// Check subscribe parameters before registering anything against them
pub fn validate_subscription(name: &str, frequency: i32) -> Result<(), ProtocolError> {
    validate_name(name, SUBSCRIBE_NAME_LEN)?;
    if frequency < 0 {
        return Err(ProtocolError::InvalidArgument(format!(
            "negative update frequency: {frequency}"
        )));
    }
    Ok(())
}

/// Write `name` as a NUL-terminated string zero-padded to `field_len` bytes
fn put_name_field(buf: &mut Vec<u8>, name: &str, field_len: usize) {
    let start = buf.len();
    buf.extend_from_slice(name.as_bytes());
    buf.resize(start + field_len, 0);
}

/// Read a name field back, trimming at the first NUL
fn name_from_field(field: &[u8]) -> Result<String, ProtocolError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| ProtocolError::MalformedPacket("dataref name is not valid UTF-8".into()))
}

/// Subscription request record: start (or stop) streaming one dataref
///
/// The simulator echoes `index` back in every update record for this
/// dataref, so the index is what demultiplexes the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Client-assigned subscription index, echoed back in updates
    pub index: u32,
    /// Requested updates per second; 0 stops the stream
    pub frequency: i32,
    /// Dataref name, e.g. `sim/cockpit2/radios/actuators/com2_standby_frequency_hz`
    pub name: String,
}

impl SubscribeRequest {
    /// Build a validated subscribe record
    pub fn new(index: u32, frequency: i32, name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        validate_subscription(&name, frequency)?;
        Ok(Self {
            index,
            frequency,
            name,
        })
    }

    /// Build the frequency-0 record that cancels a subscription
    pub fn cancel(index: u32, name: impl Into<String>) -> Result<Self, ProtocolError> {
        Self::new(index, 0, name)
    }

    /// Whether this record stops the stream rather than starting it
    pub fn is_cancel(&self) -> bool {
        self.frequency == 0
    }

    /// Encode to the fixed 413-byte wire record
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TAG_LEN + 8 + SUBSCRIBE_NAME_LEN);
        buf.extend_from_slice(RREF_REQUEST_TAG);
        buf.extend_from_slice(&self.frequency.to_le_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        put_name_field(&mut buf, &self.name, SUBSCRIBE_NAME_LEN);
        buf
    }

    /// Decode a subscribe record (the simulator side of the exchange)
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < TAG_LEN || &bytes[..TAG_LEN] != RREF_REQUEST_TAG {
            return Err(ProtocolError::MalformedPacket(
                "missing RREF request tag".into(),
            ));
        }
        let frequency = i32_at(bytes, TAG_LEN);
        let index = u32_at(bytes, TAG_LEN + 4);
        let (Some(frequency), Some(index)) = (frequency, index) else {
            return Err(ProtocolError::MalformedPacket(format!(
                "subscribe record truncated at {} bytes",
                bytes.len()
            )));
        };
        let name = name_from_field(&bytes[TAG_LEN + 8..])?;
        Ok(Self {
            index,
            frequency,
            name,
        })
    }
}

/// Publish record: write one value into the simulator
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    /// Dataref name to write
    pub name: String,
    /// New value
    pub value: f32,
}

impl PublishRequest {
    /// Build a validated publish record
    pub fn new(name: impl Into<String>, value: f32) -> Result<Self, ProtocolError> {
        let name = name.into();
        validate_name(&name, PUBLISH_NAME_LEN)?;
        Ok(Self { name, value })
    }

    /// Encode to the fixed 509-byte wire record
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TAG_LEN + 4 + PUBLISH_NAME_LEN);
        buf.extend_from_slice(DREF_REQUEST_TAG);
        buf.extend_from_slice(&self.value.to_le_bytes());
        put_name_field(&mut buf, &self.name, PUBLISH_NAME_LEN);
        buf
    }

    /// Decode a publish record (the simulator side of the exchange)
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < TAG_LEN || &bytes[..TAG_LEN] != DREF_REQUEST_TAG {
            return Err(ProtocolError::MalformedPacket(
                "missing DREF request tag".into(),
            ));
        }
        let Some(value) = f32_at(bytes, TAG_LEN) else {
            return Err(ProtocolError::MalformedPacket(format!(
                "publish record truncated at {} bytes",
                bytes.len()
            )));
        };
        let name = name_from_field(&bytes[TAG_LEN + 4..])?;
        Ok(Self { name, value })
    }
}

/// Decode every (index, value) record in a value-update datagram
///
/// Datagrams that do not carry the `RREF,` reply tag are not dataref
/// updates; they decode to an empty vec so receive loops can ignore them.
/// A reply whose payload is not a whole number of 8-byte records is
/// malformed.
pub fn decode_updates(bytes: &[u8]) -> Result<Vec<(u32, f32)>, ProtocolError> {
    let Some(payload) = bytes.strip_prefix(RREF_REPLY_TAG.as_slice()) else {
        trace!(len = bytes.len(), "datagram does not carry the reply tag");
        return Ok(Vec::new());
    };
    if payload.len() % UPDATE_RECORD_LEN != 0 {
        return Err(ProtocolError::MalformedPacket(format!(
            "update payload of {} bytes is not a whole number of records",
            payload.len()
        )));
    }
    let mut records = Vec::with_capacity(payload.len() / UPDATE_RECORD_LEN);
    for record in payload.chunks_exact(UPDATE_RECORD_LEN) {
        // chunks_exact guarantees both fields are in bounds
        let index = u32_at(record, 0).unwrap_or_default();
        let value = f32_at(record, 4).unwrap_or_default();
        records.push((index, value));
    }
    Ok(records)
}

/// Encode a batch of (index, value) records into one reply datagram
pub fn encode_updates(records: &[(u32, f32)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + records.len() * UPDATE_RECORD_LEN);
    buf.extend_from_slice(RREF_REPLY_TAG);
    for (index, value) in records {
        buf.extend_from_slice(&index.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_wire_layout() {
        let request = SubscribeRequest::new(0, 20, "sim/x").unwrap();
        let bytes = request.encode();

        assert_eq!(bytes.len(), 413);
        assert_eq!(&bytes[..5], b"RREF\0");
        assert_eq!(&bytes[5..9], &20i32.to_le_bytes());
        assert_eq!(&bytes[9..13], &0u32.to_le_bytes());
        assert_eq!(&bytes[13..18], b"sim/x");
        assert!(bytes[18..].iter().all(|&b| b == 0), "name field zero-padded");
    }

    #[test]
    fn subscribe_round_trip() {
        let request = SubscribeRequest::new(7, 5, "sim/flightmodel/position/latitude").unwrap();
        let decoded = SubscribeRequest::decode(&request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn cancel_record_has_zero_frequency() {
        let request = SubscribeRequest::cancel(3, "sim/x").unwrap();
        assert!(request.is_cancel());

        let bytes = request.encode();
        assert_eq!(&bytes[5..9], &0i32.to_le_bytes());
        assert_eq!(&bytes[9..13], &3u32.to_le_bytes());
    }

    #[test]
    fn name_at_field_limit_is_rejected() {
        let name = "x".repeat(SUBSCRIBE_NAME_LEN);
        let err = SubscribeRequest::new(0, 20, name).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));

        // one byte shorter leaves room for the terminator
        let name = "x".repeat(SUBSCRIBE_NAME_LEN - 1);
        assert!(SubscribeRequest::new(0, 20, name).is_ok());
    }

    #[test]
    fn embedded_nul_is_rejected() {
        let err = SubscribeRequest::new(0, 20, "sim/\0x").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));
    }

    #[test]
    fn negative_frequency_is_rejected() {
        let err = SubscribeRequest::new(0, -1, "sim/x").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));
    }

    #[test]
    fn truncated_subscribe_is_malformed() {
        let encoded = SubscribeRequest::new(0, 20, "sim/x").unwrap().encode();
        let err = SubscribeRequest::decode(&encoded[..9]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPacket(_)));
    }

    #[test]
    fn publish_wire_layout() {
        let request = PublishRequest::new("sim/y", 118.25).unwrap();
        let bytes = request.encode();

        assert_eq!(bytes.len(), 509);
        assert_eq!(&bytes[..5], b"DREF\0");
        assert_eq!(&bytes[5..9], &118.25f32.to_le_bytes());
        assert_eq!(&bytes[9..14], b"sim/y");
        assert!(bytes[14..].iter().all(|&b| b == 0));
    }

    #[test]
    fn publish_round_trip() {
        let request = PublishRequest::new("sim/cockpit/switches/gear_handle_status", 1.0).unwrap();
        let decoded = PublishRequest::decode(&request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn updates_decode_every_record_in_order() {
        let bytes = encode_updates(&[(0, 1.5), (1, -2.0), (7, 123.4)]);
        let records = decode_updates(&bytes).unwrap();
        assert_eq!(records, vec![(0, 1.5), (1, -2.0), (7, 123.4)]);
    }

    #[test]
    fn single_record_update() {
        let bytes = encode_updates(&[(0, 123.4)]);
        assert_eq!(bytes.len(), 13);
        assert_eq!(decode_updates(&bytes).unwrap(), vec![(0, 123.4)]);
    }

    #[test]
    fn unknown_tag_decodes_to_no_updates() {
        assert_eq!(decode_updates(b"BECN\0whatever").unwrap(), vec![]);
        assert_eq!(decode_updates(b"RREF\0").unwrap(), vec![]);
        assert_eq!(decode_updates(b"").unwrap(), vec![]);
    }

    #[test]
    fn ragged_update_payload_is_malformed() {
        let mut bytes = encode_updates(&[(0, 1.0)]);
        bytes.pop();
        let err = decode_updates(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPacket(_)));
    }

    #[test]
    fn empty_reply_carries_no_records() {
        assert_eq!(decode_updates(RREF_REPLY_TAG).unwrap(), vec![]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn dataref_name() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_/]{0,120}"
        }

        proptest! {
            #[test]
            fn subscribe_always_round_trips(
                index in 0u32..10_000,
                frequency in 0i32..=100,
                name in dataref_name(),
            ) {
                let request = SubscribeRequest::new(index, frequency, name).unwrap();
                let bytes = request.encode();
                prop_assert_eq!(bytes.len(), 5 + 8 + SUBSCRIBE_NAME_LEN);
                prop_assert_eq!(SubscribeRequest::decode(&bytes).unwrap(), request);
            }

            #[test]
            fn publish_always_round_trips(value in -1e6f32..1e6, name in dataref_name()) {
                let request = PublishRequest::new(name, value).unwrap();
                let bytes = request.encode();
                prop_assert_eq!(bytes.len(), 5 + 4 + PUBLISH_NAME_LEN);
                prop_assert_eq!(PublishRequest::decode(&bytes).unwrap(), request);
            }

            #[test]
            fn update_batches_preserve_count_and_order(
                records in proptest::collection::vec((0u32..64, -1e6f32..1e6), 0..32)
            ) {
                let bytes = encode_updates(&records);
                prop_assert_eq!(decode_updates(&bytes).unwrap(), records);
            }
        }
    }
}
