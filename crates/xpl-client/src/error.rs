//! Error types for the client session

use thiserror::Error;

/// Errors that can occur in the subscription registry and client session
#[derive(Debug, Error)]
pub enum ClientError {
    /// Lookup against a dataref that was never subscribed (or already
    /// unsubscribed)
    #[error("not subscribed: {0}")]
    NotSubscribed(String),

    /// Inbound update for an index with no live subscription
    ///
    /// Non-fatal: receive loops log the drop and continue.
    #[error("no subscription for index {0}")]
    UnknownIndex(u32),

    /// Operation attempted after the session was closed
    #[error("session closed")]
    Closed,

    /// Wire encode/decode failure
    #[error("protocol error: {0}")]
    Protocol(#[from] xpl_protocol::ProtocolError),

    /// Discovery failure while resolving the simulator address
    #[error("discovery error: {0}")]
    Discovery(#[from] xpl_discover::DiscoverError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
