//! Discovery beacon parsing
//!
//! Every running simulator instance periodically broadcasts a beacon on the
//! discovery multicast group. The beacon advertises who is broadcasting and
//! where dataref traffic should be sent.
//!
//! # Format
//! `BECN\0` + u8 major + u8 minor + i32 host id + i32 simulator version +
//! u32 role + u16 dataref port + NUL-terminated computer name + u16
//! auxiliary (raknet) port. Integers little-endian.

use std::fmt;
use std::net::SocketAddr;

use crate::bytes::{i32_at, u16_at, u32_at, u8_at};
use crate::error::ProtocolError;

/// Tag field on beacon datagrams
pub const BEACON_TAG: &[u8; 5] = b"BECN\0";

/// Role value advertised by the authoritative simulator instance
///
/// Anything else is a companion/visual-only instance and does not own
/// dataref state.
pub const ROLE_PRIMARY: u32 = 1;

/// One decoded discovery beacon
///
/// Immutable once parsed; constructed per received datagram during
/// discovery and either selected as the session target or discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Beacon {
    /// Network address the beacon was received from
    pub source: SocketAddr,
    /// Beacon protocol major version
    pub major: u8,
    /// Beacon protocol minor version
    pub minor: u8,
    /// Application host identifier
    pub host_id: i32,
    /// Simulator build number
    pub version: i32,
    /// Instance role; see [`ROLE_PRIMARY`]
    pub role: u32,
    /// UDP port the instance listens on for dataref traffic
    pub port: u16,
    /// Name of the machine running the instance
    pub computer_name: String,
    /// Auxiliary (raknet) port advertised alongside the dataref port
    pub raknet_port: u16,
}

impl Beacon {
    /// Decode a beacon datagram received from `source`
    pub fn decode(bytes: &[u8], source: SocketAddr) -> Result<Self, ProtocolError> {
        if bytes.len() < BEACON_TAG.len() || &bytes[..BEACON_TAG.len()] != BEACON_TAG {
            return Err(ProtocolError::MalformedPacket("missing beacon tag".into()));
        }

        let truncated = || {
            ProtocolError::MalformedPacket(format!("beacon truncated at {} bytes", bytes.len()))
        };

        let major = u8_at(bytes, 5).ok_or_else(truncated)?;
        let minor = u8_at(bytes, 6).ok_or_else(truncated)?;
        let host_id = i32_at(bytes, 7).ok_or_else(truncated)?;
        let version = i32_at(bytes, 11).ok_or_else(truncated)?;
        let role = u32_at(bytes, 15).ok_or_else(truncated)?;
        let port = u16_at(bytes, 19).ok_or_else(truncated)?;

        let name_field = &bytes[21..];
        let name_end = name_field
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| {
                ProtocolError::MalformedPacket("beacon computer name is unterminated".into())
            })?;
        let computer_name = std::str::from_utf8(&name_field[..name_end])
            .map_err(|_| {
                ProtocolError::MalformedPacket("beacon computer name is not valid UTF-8".into())
            })?
            .to_owned();

        let raknet_port = u16_at(bytes, 21 + name_end + 1).ok_or_else(truncated)?;

        Ok(Self {
            source,
            major,
            minor,
            host_id,
            version,
            role,
            port,
            computer_name,
            raknet_port,
        })
    }

    /// Encode this beacon's wire fields (the announcing side)
    ///
    /// The source address is where the datagram comes from, not part of
    /// the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(21 + self.computer_name.len() + 3);
        buf.extend_from_slice(BEACON_TAG);
        buf.push(self.major);
        buf.push(self.minor);
        buf.extend_from_slice(&self.host_id.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.role.to_le_bytes());
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf.extend_from_slice(self.computer_name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.raknet_port.to_le_bytes());
        buf
    }

    /// Whether this beacon came from the authoritative instance
    pub fn is_primary(&self) -> bool {
        self.role == ROLE_PRIMARY
    }

    /// Where dataref traffic for this instance should be sent
    ///
    /// The beacon's sender IP paired with the dataref port it advertises.
    pub fn data_addr(&self) -> SocketAddr {
        SocketAddr::new(self.source.ip(), self.port)
    }
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.is_primary() {
            "primary"
        } else {
            "secondary"
        };
        write!(
            f,
            "{} build {} ({}) at {}",
            self.computer_name,
            self.version,
            role,
            self.data_addr()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(role: u32) -> Beacon {
        Beacon {
            source: "192.168.1.20:49707".parse().unwrap(),
            major: 1,
            minor: 2,
            host_id: 1,
            version: 115501,
            role,
            port: 49000,
            computer_name: "SIM-PC".to_owned(),
            raknet_port: 49010,
        }
    }

    #[test]
    fn beacon_round_trip() {
        let beacon = sample(ROLE_PRIMARY);
        let decoded = Beacon::decode(&beacon.encode(), beacon.source).unwrap();
        assert_eq!(decoded, beacon);
    }

    #[test]
    fn wire_layout() {
        let bytes = sample(ROLE_PRIMARY).encode();

        assert_eq!(&bytes[..5], b"BECN\0");
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[6], 2);
        assert_eq!(&bytes[15..19], &1u32.to_le_bytes());
        assert_eq!(&bytes[19..21], &49000u16.to_le_bytes());
        assert_eq!(&bytes[21..27], b"SIM-PC");
        assert_eq!(bytes[27], 0);
        assert_eq!(&bytes[28..30], &49010u16.to_le_bytes());
        assert_eq!(bytes.len(), 30);
    }

    #[test]
    fn role_selects_primary() {
        assert!(sample(ROLE_PRIMARY).is_primary());
        assert!(!sample(0).is_primary());
        assert!(!sample(2).is_primary());
    }

    #[test]
    fn data_addr_pairs_sender_ip_with_advertised_port() {
        let beacon = sample(ROLE_PRIMARY);
        assert_eq!(beacon.data_addr(), "192.168.1.20:49000".parse().unwrap());
    }

    #[test]
    fn bad_tag_is_malformed() {
        let mut bytes = sample(ROLE_PRIMARY).encode();
        bytes[0] = b'X';
        let err = Beacon::decode(&bytes, "127.0.0.1:1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPacket(_)));
    }

    #[test]
    fn truncation_is_malformed_not_a_panic() {
        let bytes = sample(ROLE_PRIMARY).encode();
        for len in 0..bytes.len() {
            let result = Beacon::decode(&bytes[..len], "127.0.0.1:1".parse().unwrap());
            assert!(
                matches!(result, Err(ProtocolError::MalformedPacket(_))),
                "prefix of {len} bytes should be malformed"
            );
        }
    }

    #[test]
    fn missing_aux_port_is_malformed() {
        let mut bytes = sample(ROLE_PRIMARY).encode();
        bytes.truncate(bytes.len() - 2);
        let err = Beacon::decode(&bytes, "127.0.0.1:1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPacket(_)));
    }
}
