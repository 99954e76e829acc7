//! Dataref Client
//!
//! This crate provides the client session for the simulator's UDP dataref
//! protocol. A session owns one socket and one subscription registry;
//! subscribing streams a named value at a requested frequency, the receive
//! loop demultiplexes inbound update records by index and invokes the
//! matching callbacks, and publishing writes values back.
//!
//! # Architecture
//!
//! - [`SubscriptionRegistry`] allocates indices (monotonic from 0, never
//!   reused), maps names to indices and indices to callbacks, and performs
//!   dispatch
//! - [`DatarefSession`] resolves the simulator endpoint (explicitly
//!   configured, or via beacon discovery), sends subscribe/unsubscribe/
//!   publish datagrams, and drives the receive loop in blocking or
//!   non-blocking mode
//!
//! # Example
//!
//! ```rust,no_run
//! use xpl_client::{DatarefSession, SessionConfig};
//!
//! # async fn example() -> Result<(), xpl_client::ClientError> {
//! // discover the simulator, then stream one dataref
//! let session = DatarefSession::connect(SessionConfig::default()).await?;
//! session
//!     .subscribe("sim/cockpit2/radios/actuators/com2_standby_frequency_hz", 20, |value| {
//!         println!("COM2 standby: {value}");
//!     })
//!     .await?;
//! session.run_forever().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod session;

pub use error::ClientError;
pub use registry::{Subscription, SubscriptionRegistry, UpdateCallback};
pub use session::{DatarefSession, SessionConfig};
