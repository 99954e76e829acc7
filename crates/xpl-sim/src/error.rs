//! Error types for the virtual simulator

use thiserror::Error;

/// Errors that can occur while serving the virtual simulator
#[derive(Debug, Error)]
pub enum SimError {
    /// Socket failure in the serve loop
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
