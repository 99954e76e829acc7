//! Multicast beacon listener
//!
//! Simulator instances broadcast `BECN` datagrams on a well-known multicast
//! group. The listener joins that group, decodes each beacon, and resolves
//! discovery when the authoritative (primary) instance is heard. Secondary
//! and visual-only instances are observed and discarded.
//!
//! The listening socket is opened with address/port reuse so several local
//! programs can watch the same discovery port at once.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use xpl_protocol::Beacon;

use crate::error::DiscoverError;

/// Largest beacon datagram we expect to receive
const MAX_BEACON_LEN: usize = 1500;

/// Discovery configuration
///
/// The multicast group, port, and interface are protocol conventions, not
/// constants; every field can be overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Multicast group the simulator broadcasts beacons on
    pub group: Ipv4Addr,
    /// Discovery port to bind
    pub port: u16,
    /// Local interface used for the multicast join
    pub interface: Ipv4Addr,
    /// Bound on how long [`BeaconListener::discover`] waits for a primary
    /// beacon before failing
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 255, 1, 1),
            port: 49707,
            interface: Ipv4Addr::UNSPECIFIED,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Listener for simulator discovery beacons
pub struct BeaconListener {
    socket: UdpSocket,
    config: DiscoveryConfig,
}

impl BeaconListener {
    /// Bind the discovery port and join the multicast group
    ///
    /// The socket is created through `socket2` so SO_REUSEADDR (and
    /// SO_REUSEPORT where available) can be set before binding; multiple
    /// local listeners on the discovery port must coexist. Must be called
    /// from within a tokio runtime.
    pub fn bind(config: DiscoveryConfig) -> Result<Self, DiscoverError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "freebsd"))]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        socket.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        socket.set_multicast_loop_v4(true)?;
        socket.join_multicast_v4(config.group, config.interface)?;

        info!(
            group = %config.group,
            port = config.port,
            "listening for simulator beacons"
        );

        Ok(Self { socket, config })
    }

    /// Wrap an already-bound socket
    ///
    /// Lets tests (or embedders with their own socket policy) feed beacons
    /// through a plain loopback socket instead of real multicast traffic.
    pub fn from_socket(socket: UdpSocket, config: DiscoveryConfig) -> Self {
        Self { socket, config }
    }

    /// The local address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoverError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive the next decodable beacon, whatever its role
    ///
    /// Datagrams that fail to decode are logged and skipped; a stray or
    /// corrupt packet must not abort discovery.
    pub async fn recv_beacon(&self) -> Result<Beacon, DiscoverError> {
        let mut buf = [0u8; MAX_BEACON_LEN];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            match Beacon::decode(&buf[..len], src) {
                Ok(beacon) => return Ok(beacon),
                Err(err) => {
                    warn!(%src, len, error = %err, "skipping undecodable beacon datagram");
                }
            }
        }
    }

    /// Wait for the primary instance, bounded by the configured timeout
    ///
    /// Returns the winning beacon so callers can log or inspect the
    /// instance they resolved to.
    pub async fn discover(&self) -> Result<Beacon, DiscoverError> {
        match timeout(self.config.timeout, self.wait_for_primary()).await {
            Ok(result) => result,
            Err(_) => Err(DiscoverError::DiscoveryTimeout {
                waited: self.config.timeout,
            }),
        }
    }

    async fn wait_for_primary(&self) -> Result<Beacon, DiscoverError> {
        loop {
            let beacon = self.recv_beacon().await?;
            if beacon.is_primary() {
                info!(%beacon, "primary simulator instance found");
                return Ok(beacon);
            }
            debug!(%beacon, "ignoring non-primary instance");
        }
    }
}

/// Bind, discover the primary instance, and return its beacon
///
/// Convenience wrapper for the common one-shot case.
pub async fn discover(config: DiscoveryConfig) -> Result<Beacon, DiscoverError> {
    BeaconListener::bind(config)?.discover().await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_listener(timeout: Duration) -> (BeaconListener, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let config = DiscoveryConfig {
            timeout,
            ..Default::default()
        };
        (BeaconListener::from_socket(socket, config), addr)
    }

    fn beacon_bytes(role: u32, port: u16, name: &str) -> Vec<u8> {
        Beacon {
            source: "0.0.0.0:0".parse().unwrap(),
            major: 1,
            minor: 2,
            host_id: 1,
            version: 115501,
            role,
            port,
            computer_name: name.to_owned(),
            raknet_port: 0,
        }
        .encode()
    }

    #[test]
    fn config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.group, Ipv4Addr::new(239, 255, 1, 1));
        assert_eq!(config.port, 49707);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn discover_selects_the_primary_instance() {
        let (listener, addr) = loopback_listener(Duration::from_secs(5)).await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&beacon_bytes(0, 49001, "visual-1"), addr)
            .await
            .unwrap();
        sender
            .send_to(&beacon_bytes(xpl_protocol::ROLE_PRIMARY, 49000, "main"), addr)
            .await
            .unwrap();
        sender
            .send_to(&beacon_bytes(2, 49002, "visual-2"), addr)
            .await
            .unwrap();

        let beacon = listener.discover().await.unwrap();
        assert!(beacon.is_primary());
        assert_eq!(beacon.computer_name, "main");
        assert_eq!(beacon.port, 49000);
        assert_eq!(beacon.source.ip(), addr.ip());
    }

    #[tokio::test]
    async fn malformed_datagrams_do_not_abort_discovery() {
        let (listener, addr) = loopback_listener(Duration::from_secs(5)).await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        sender.send_to(&[0u8; 3], addr).await.unwrap();
        sender
            .send_to(&beacon_bytes(xpl_protocol::ROLE_PRIMARY, 49000, "main"), addr)
            .await
            .unwrap();

        let beacon = listener.discover().await.unwrap();
        assert_eq!(beacon.computer_name, "main");
    }

    #[tokio::test]
    async fn discovery_times_out_without_a_primary() {
        let (listener, addr) = loopback_listener(Duration::from_millis(80)).await;

        // a secondary beacon alone must not satisfy discovery
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&beacon_bytes(0, 49001, "visual"), addr)
            .await
            .unwrap();

        let err = listener.discover().await.unwrap_err();
        assert!(matches!(err, DiscoverError::DiscoveryTimeout { .. }));
    }

    #[tokio::test]
    async fn recv_beacon_returns_any_role() {
        let (listener, addr) = loopback_listener(Duration::from_secs(5)).await;

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&beacon_bytes(0, 49001, "visual"), addr)
            .await
            .unwrap();

        let beacon = listener.recv_beacon().await.unwrap();
        assert!(!beacon.is_primary());
        assert_eq!(beacon.computer_name, "visual");
    }
}
