//! Client session
//!
//! The session is the orchestrating object: it owns the local socket, the
//! subscription registry, and the shutdown signal. All operations go
//! through it — there is no implicit global socket state. One logical
//! stream of control reads the socket; subscribe/unsubscribe may be driven
//! from another task, which is why the registry sits behind a single mutex.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use xpl_discover::{BeaconListener, DiscoveryConfig};
use xpl_protocol::dataref::{self, PublishRequest, SubscribeRequest};

use crate::error::ClientError;
use crate::registry::SubscriptionRegistry;

/// Largest inbound datagram the receive loop accepts
const MAX_DATAGRAM_LEN: usize = 2048;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Simulator dataref endpoint; `None` runs beacon discovery instead
    pub remote: Option<SocketAddr>,
    /// Local address to bind the session socket to
    pub bind_addr: SocketAddr,
    /// Discovery parameters used when `remote` is `None`
    pub discovery: DiscoveryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            remote: None,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// A dataref client session
///
/// Blocking and non-blocking receive are both supported on the same
/// socket: [`recv_one`](Self::recv_one) suspends until a datagram (or
/// shutdown) arrives, while [`try_recv_one`](Self::try_recv_one) returns
/// immediately and reports "no data yet" as `Ok(None)`. Callers driving
/// the non-blocking mode should wait on [`readable`](Self::readable)
/// between attempts rather than spinning.
pub struct DatarefSession {
    socket: UdpSocket,
    remote: SocketAddr,
    registry: Mutex<SubscriptionRegistry>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl DatarefSession {
    /// Open a session, running beacon discovery if no remote is configured
    pub async fn connect(config: SessionConfig) -> Result<Self, ClientError> {
        let remote = match config.remote {
            Some(addr) => addr,
            None => {
                let listener = BeaconListener::bind(config.discovery)?;
                let beacon = listener.discover().await?;
                beacon.data_addr()
            }
        };

        let socket = UdpSocket::bind(config.bind_addr).await?;
        info!(local = %socket.local_addr()?, %remote, "dataref session open");

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            socket,
            remote,
            registry: Mutex::new(SubscriptionRegistry::new()),
            closed: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    /// Open a session to a known simulator endpoint, skipping discovery
    pub async fn connect_to(remote: SocketAddr) -> Result<Self, ClientError> {
        Self::connect(SessionConfig {
            remote: Some(remote),
            ..Default::default()
        })
        .await
    }

    /// The resolved simulator endpoint
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// The local address the session socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.registry().len()
    }

    /// Subscribe to a dataref at `frequency` updates per second
    ///
    /// Registers the callback, assigns the next index, and sends one
    /// subscribe datagram. Subscribing a name that is already live issues a
    /// fresh registration under a new index; the old one stops dispatching.
    pub async fn subscribe<F>(
        &self,
        name: &str,
        frequency: i32,
        callback: F,
    ) -> Result<u32, ClientError>
    where
        F: FnMut(f32) + Send + 'static,
    {
        self.ensure_open()?;
        // validate before touching the registry so a bad name never
        // leaves a dangling entry
        dataref::validate_subscription(name, frequency)?;

        let index = self.registry().register(name, frequency, Box::new(callback));
        let request = SubscribeRequest::new(index, frequency, name)?;
        self.socket.send_to(&request.encode(), self.remote).await?;

        debug!(name, index, frequency, "subscribed");
        Ok(index)
    }

    /// Cancel a live subscription
    ///
    /// Removes the registry entry and sends the frequency-0 record with the
    /// retired index. Fails with `NotSubscribed` if the name is not live.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), ClientError> {
        self.ensure_open()?;
        let subscription = self.registry().remove_by_name(name)?;
        let request = SubscribeRequest::cancel(subscription.index(), name)?;
        self.socket.send_to(&request.encode(), self.remote).await?;

        debug!(name, index = subscription.index(), "unsubscribed");
        Ok(())
    }

    /// Write a value into the simulator
    ///
    /// Fire-and-forget: the protocol carries no acknowledgment.
    pub async fn publish(&self, name: &str, value: f32) -> Result<(), ClientError> {
        self.ensure_open()?;
        let request = PublishRequest::new(name, value)?;
        self.socket.send_to(&request.encode(), self.remote).await?;

        trace!(name, value, "published dataref value");
        Ok(())
    }

    /// Receive one datagram and dispatch every update record it carries
    ///
    /// Suspends until a datagram arrives or the session is closed; a close
    /// while waiting returns [`ClientError::Closed`]. Returns the number of
    /// callbacks invoked — 0 for datagrams that are not dataref updates.
    /// Callbacks run on the task driving the receive and must not call
    /// back into the session.
    pub async fn recv_one(&self) -> Result<usize, ClientError> {
        self.ensure_open()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // a close may have landed between the open check and subscribing
        if *shutdown_rx.borrow_and_update() {
            return Err(ClientError::Closed);
        }
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        tokio::select! {
            result = self.socket.recv_from(&mut buf) => {
                let (len, src) = result?;
                trace!(%src, len, "received datagram");
                self.dispatch_datagram(&buf[..len])
            }
            _ = shutdown_rx.changed() => Err(ClientError::Closed),
        }
    }

    /// Non-blocking variant of [`recv_one`](Self::recv_one)
    ///
    /// `Ok(None)` means no datagram was ready — a normal control-flow
    /// signal, not an error. Pair with [`readable`](Self::readable) to wait
    /// for the next attempt.
    pub fn try_recv_one(&self) -> Result<Option<usize>, ClientError> {
        self.ensure_open()?;
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        match self.socket.try_recv_from(&mut buf) {
            Ok((len, src)) => {
                trace!(%src, len, "received datagram");
                self.dispatch_datagram(&buf[..len]).map(Some)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Wait until the socket has a datagram to read
    pub async fn readable(&self) -> Result<(), ClientError> {
        self.ensure_open()?;
        self.socket.readable().await?;
        Ok(())
    }

    /// Receive and dispatch until the session is closed
    ///
    /// Undecodable datagrams are logged and dropped; the loop only ends on
    /// close (clean return) or a socket error. Signal handling belongs to
    /// the embedding application — pair this with its own Ctrl-C handler
    /// and a call to [`close`](Self::close).
    pub async fn run_forever(&self) -> Result<(), ClientError> {
        loop {
            match self.recv_one().await {
                Ok(_) => {}
                Err(ClientError::Closed) => return Ok(()),
                Err(ClientError::Protocol(err)) => {
                    warn!(error = %err, "dropping undecodable datagram");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Tear the session down
    ///
    /// Sends a cancellation record for every live subscription, unblocks
    /// any pending blocking receive, and marks the session closed. All
    /// later operations fail with [`ClientError::Closed`]. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let subscriptions = self.registry().drain();
        for subscription in &subscriptions {
            let request = SubscribeRequest::cancel(subscription.index(), subscription.name())?;
            if let Err(err) = self.socket.send_to(&request.encode(), self.remote).await {
                warn!(
                    name = subscription.name(),
                    error = %err,
                    "failed to send cancellation during teardown"
                );
            }
        }

        let _ = self.shutdown_tx.send(true);
        info!(cancelled = subscriptions.len(), "dataref session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    /// Decode a datagram and dispatch each record in order
    fn dispatch_datagram(&self, bytes: &[u8]) -> Result<usize, ClientError> {
        let records = dataref::decode_updates(bytes)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut dispatched = 0;
        let mut registry = self.registry();
        for (index, value) in records {
            match registry.dispatch(index, value) {
                Ok(()) => dispatched += 1,
                Err(err) => warn!(index, value, error = %err, "dropping update record"),
            }
        }
        Ok(dispatched)
    }

    fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        // a poisoned lock only means a callback panicked; both maps are
        // still consistent, so keep going
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
