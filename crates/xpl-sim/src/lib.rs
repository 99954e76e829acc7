//! Virtual Simulator
//!
//! This crate provides a protocol-accurate stand-in for a running
//! simulator instance, so the dataref client (and anything built on it)
//! can be exercised without a live network or a copy of the simulator.
//!
//! The split mirrors the wire/driver boundary: [`VirtualSimulator`] is
//! plain synchronous state — a dataref table, a subscription table, and a
//! queue of encoded reply datagrams — while [`task::run_simulator`] pumps
//! a real UDP socket against it and [`task::run_beacon_announcer`] plays
//! the discovery broadcast.
//!
//! # Example
//!
//! ```rust
//! use xpl_sim::{VirtualSimulator, VirtualSimulatorConfig};
//!
//! let mut sim = VirtualSimulator::from_config(VirtualSimulatorConfig {
//!     datarefs: vec![("sim/test".into(), 7.5)],
//!     ..Default::default()
//! });
//!
//! // a subscribe record queues an immediate update with the current value
//! let subscribe = xpl_protocol::SubscribeRequest::new(0, 20, "sim/test").unwrap();
//! sim.handle_datagram(&subscribe.encode());
//! let reply = sim.poll_output().unwrap();
//! assert_eq!(xpl_protocol::decode_updates(&reply).unwrap(), vec![(0, 7.5)]);
//! ```

pub mod error;
pub mod instance;
pub mod task;

pub use error::SimError;
pub use instance::{VirtualSimulator, VirtualSimulatorConfig};
pub use task::{run_beacon_announcer, run_simulator, shared, SharedSimulator};
