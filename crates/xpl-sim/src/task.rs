//! Async serve loops for the virtual simulator
//!
//! [`run_simulator`] owns a UDP socket and pumps it against a shared
//! [`VirtualSimulator`]: inbound datagrams are handed to the instance,
//! queued replies are flushed to the most recent client, and a periodic
//! tick streams subscription updates. [`run_beacon_announcer`] plays the
//! discovery side, re-broadcasting a beacon at a fixed interval.
//!
//! Both loops stop when their `watch` shutdown channel flips to `true`,
//! so tests can end them deterministically.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::SimError;
use crate::instance::VirtualSimulator;

/// A virtual simulator shared between the serve loop and the test driving it
pub type SharedSimulator = Arc<Mutex<VirtualSimulator>>;

/// Wrap a simulator for use with [`run_simulator`]
pub fn shared(sim: VirtualSimulator) -> SharedSimulator {
    Arc::new(Mutex::new(sim))
}

fn lock(sim: &SharedSimulator) -> MutexGuard<'_, VirtualSimulator> {
    sim.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serve the virtual simulator on `socket` until shutdown
///
/// Replies go to whichever client spoke last; the virtual instance serves
/// one client at a time, which is all the tests need.
pub async fn run_simulator(
    socket: UdpSocket,
    sim: SharedSimulator,
    update_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SimError> {
    let mut buf = [0u8; 2048];
    let mut client: Option<SocketAddr> = None;

    let mut ticker = interval(update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(local = %socket.local_addr()?, "virtual simulator serving");

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, src) = result?;
                trace!(%src, len, "request datagram");
                client = Some(src);
                lock(&sim).handle_datagram(&buf[..len]);
                flush_pending(&socket, &sim, client).await?;
            }
            _ = ticker.tick() => {
                lock(&sim).tick();
                flush_pending(&socket, &sim, client).await?;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("virtual simulator shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Broadcast `beacon` to `target` every `period` until shutdown
pub async fn run_beacon_announcer(
    socket: UdpSocket,
    beacon: Vec<u8>,
    target: SocketAddr,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SimError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                socket.send_to(&beacon, target).await?;
                trace!(%target, "beacon announced");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

/// Drain queued replies to the active client
///
/// The simulator lock is released before each send so a slow socket never
/// holds up state changes from the test side.
async fn flush_pending(
    socket: &UdpSocket,
    sim: &SharedSimulator,
    client: Option<SocketAddr>,
) -> Result<(), SimError> {
    let Some(addr) = client else {
        return Ok(());
    };
    loop {
        let next = lock(sim).poll_output();
        let Some(datagram) = next else {
            return Ok(());
        };
        socket.send_to(&datagram, addr).await?;
    }
}
