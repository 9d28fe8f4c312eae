//! Unified error types for the Switchgear exchange engine.
//!
//! Each layer of the engine owns one error enum. Errors that cross layers
//! convert with `#[from]` so call sites can use `?` all the way up to the
//! [`ServiceDomain`](crate::domain::ServiceDomain).

use thiserror::Error;

use crate::foundation::metadata::ExchangePhase;

// =============================================================================
// Metadata Errors
// =============================================================================

/// Errors raised while building names or operation catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// A qualified name could not be parsed.
    #[error("invalid qualified name '{name}': {reason}")]
    InvalidName {
        /// The rejected input.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An operation declares a parameter list the engine cannot map.
    #[error("operation '{operation}' declares {count} parameters, exactly one is supported")]
    UnsupportedParameters {
        /// The operation name.
        operation: String,
        /// Number of declared parameters.
        count: usize,
    },

    /// Two operations share one name inside a catalog.
    #[error("duplicate operation '{0}' in service interface")]
    DuplicateOperation(String),
}

impl MetadataError {
    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }
}

// =============================================================================
// Handler Chain Errors
// =============================================================================

/// Errors raised by structural chain edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// A handler with this name already exists in the chain.
    #[error("handler '{0}' already exists in chain")]
    DuplicateName(String),

    /// No handler with this name exists in the chain.
    #[error("handler '{0}' not found in chain")]
    NotFound(String),
}

// =============================================================================
// Handler Errors
// =============================================================================

/// A handler-level fault.
///
/// Returning one of these from a handler stops forward progress of the chain
/// and triggers fault notification of every handler in the chain.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Generic fault raised by a handler.
    #[error("{0}")]
    Fault(String),

    /// A message body failed validation.
    #[error("validation of '{type_name}' failed: {reason}")]
    Validation {
        /// The validated type.
        type_name: String,
        /// Validator message.
        reason: String,
    },

    /// A transformation could not be applied.
    #[error("transformation from '{from}' to '{to}' failed: {reason}")]
    Transform {
        /// Source type.
        from: String,
        /// Target type.
        to: String,
        /// Failure reason.
        reason: String,
    },

    /// A policy requirement could not be satisfied.
    #[error("policy error: {0}")]
    Policy(String),

    /// The handler attempted an illegal exchange operation.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl HandlerError {
    /// Creates a generic fault.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Error returned by a transformer or validator function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    /// Creates a new transform error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

// =============================================================================
// Bus Errors
// =============================================================================

/// Errors raised by exchange buses and dispatchers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The bus was used before `init`.
    #[error("exchange bus '{0}' is not initialized")]
    NotInitialized(String),

    /// `init` was called on an initialized bus.
    #[error("exchange bus '{0}' is already initialized")]
    AlreadyInitialized(String),

    /// `start` was called on a running dispatcher.
    #[error("dispatcher for '{0}' is already started")]
    AlreadyStarted(String),

    /// The dispatcher is not accepting deliveries.
    #[error("dispatcher for '{0}' is not running")]
    NotRunning(String),

    /// The dispatcher has no channel for the exchange phase.
    #[error("dispatcher for '{service}' has no {phase} channel")]
    NoChannel {
        /// Service the dispatcher is bound to.
        service: String,
        /// Phase that had no channel.
        phase: ExchangePhase,
    },

    /// Underlying transport failure.
    #[error("transport failure on '{service}': {reason}")]
    Transport {
        /// Service the dispatcher is bound to.
        service: String,
        /// Transport message.
        reason: String,
    },
}

impl BusError {
    /// Creates a transport error.
    pub fn transport(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Exchange Errors
// =============================================================================

/// Errors raised while constructing or driving an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The contract carries no caller-side invocation metadata.
    #[error("invalid contract: no invoker invocation metadata")]
    MissingInvokerMetadata,

    /// The contract carries no provider-side operation.
    #[error("invalid contract: no service operation for '{0}'")]
    MissingOperation(String),

    /// A request/reply exchange was built without a reply chain.
    #[error("request/reply exchange for operation '{0}' requires a reply handler")]
    MissingReplyChain(String),

    /// The call is not legal in the exchange's current phase or state.
    #[error("illegal exchange state: {0}")]
    IllegalState(String),

    /// The dispatcher rejected the delivery.
    #[error(transparent)]
    Dispatch(#[from] BusError),
}

impl ExchangeError {
    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised by service registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The service is not registered.
    #[error("service '{0}' is not registered")]
    NotRegistered(String),

    /// The service instance is already registered.
    #[error("service '{0}' is already registered")]
    AlreadyRegistered(String),
}

// =============================================================================
// Domain Errors
// =============================================================================

/// Errors surfaced by [`ServiceDomain`](crate::domain::ServiceDomain).
#[derive(Debug, Error)]
pub enum DomainError {
    /// Invalid name or catalog.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// No service is bound to the requested name.
    #[error("no registered service found for '{0}'")]
    NoServiceFound(String),

    /// The default chain can no longer change.
    #[error("default handler chain is sealed once a service has been registered")]
    ChainSealed,

    /// Chain edit failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Exchange construction failure.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for handler entry points.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Result type for bus and dispatcher operations.
pub type BusResult<T> = Result<T, BusError>;

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
