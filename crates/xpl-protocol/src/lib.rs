//! X-Plane Dataref Wire Protocol
//!
//! This crate provides encoding and decoding for the UDP datagrams of the
//! simulator's dataref protocol:
//!
//! - **Subscribe/unsubscribe**: `RREF` request records asking the simulator
//!   to stream a named value at a requested frequency (0 cancels)
//! - **Value update**: `RREF,` reply datagrams batching one or more
//!   (index, value) records
//! - **Publish**: `DREF` records writing a value into the simulator
//! - **Beacon**: `BECN` discovery broadcasts advertising a running instance
//!
//! Each datagram is one complete message; there is no streaming reassembly.
//! All integers are little-endian and dataref names travel as
//! NUL-terminated strings zero-padded to fixed field widths.
//!
//! # Example
//!
//! ```rust
//! use xpl_protocol::{decode_updates, encode_updates, SubscribeRequest};
//!
//! // Ask for 20 updates/second of one dataref, demultiplexed as index 0
//! let request = SubscribeRequest::new(0, 20, "sim/x")?;
//! assert_eq!(request.encode().len(), 413);
//!
//! // A reply datagram may batch several (index, value) records
//! let reply = encode_updates(&[(0, 123.4), (1, 9.0)]);
//! assert_eq!(decode_updates(&reply)?.len(), 2);
//! # Ok::<(), xpl_protocol::ProtocolError>(())
//! ```

pub mod beacon;
mod bytes;
pub mod dataref;
pub mod error;

pub use beacon::{Beacon, BEACON_TAG, ROLE_PRIMARY};
pub use dataref::{
    decode_updates, encode_updates, validate_name, validate_subscription, PublishRequest,
    SubscribeRequest, DREF_REQUEST_TAG, PUBLISH_NAME_LEN, RREF_REPLY_TAG, RREF_REQUEST_TAG,
    SUBSCRIBE_NAME_LEN, UPDATE_RECORD_LEN,
};
pub use error::ProtocolError;
