//! Runtime error types.

use switchgear_core::{BusError, DomainError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No bus provider under this name.
    #[error("Unknown exchange bus provider: {0}")]
    UnknownBus(String),

    /// No registry provider under this name.
    #[error("Unknown service registry provider: {0}")]
    UnknownRegistry(String),

    /// Domain already exists.
    #[error("Domain already exists: {0}")]
    DomainExists(String),

    /// Domain not found.
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    /// Bus lifecycle failure.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Domain operation failure.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
