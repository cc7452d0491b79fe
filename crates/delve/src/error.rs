//! Unified error type for the Delve server.

use delve_command::CommandError;
use delve_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// Only startup and configuration failures reach the caller. Faults on a
/// single connection end that session and are logged instead.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    /// Binding or accepting failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Dispatch table setup failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
