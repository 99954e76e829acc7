//! Error types for beacon discovery

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during discovery
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// No primary-instance beacon was observed within the configured bound
    #[error("no primary simulator beacon within {waited:?}")]
    DiscoveryTimeout {
        /// How long the listener waited before giving up
        waited: Duration,
    },

    /// Socket setup or receive failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
