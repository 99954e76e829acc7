//! Simulator Discovery Library
//!
//! This crate finds the network location of the authoritative simulator
//! instance by listening for its multicast discovery beacons. Callers that
//! already know the simulator's address never need it; a session configured
//! without an explicit address runs discovery first.
//!
//! # Example
//!
//! ```rust,no_run
//! use xpl_discover::{discover, DiscoveryConfig};
//!
//! # async fn example() -> Result<(), xpl_discover::DiscoverError> {
//! let beacon = discover(DiscoveryConfig::default()).await?;
//! println!("dataref traffic goes to {}", beacon.data_addr());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod listener;

pub use error::DiscoverError;
pub use listener::{discover, BeaconListener, DiscoveryConfig};
