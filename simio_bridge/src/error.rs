//! Service-level error type.

use simio_common::config::ConfigError;
use simio_common::unit::driver::UnitError;
use thiserror::Error;

/// Errors surfaced by the [`crate::bridge::Bridge`] and the binary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A device unit could not be created, started or stopped.
    #[error(transparent)]
    Unit(#[from] UnitError),

    /// Transport or runtime I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No unit with this name is configured.
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),
}
