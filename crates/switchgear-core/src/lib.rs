//! # Switchgear Core
//!
//! The exchange engine of the Switchgear service bus.
//!
//! This crate contains everything that does not depend on a concrete
//! transport: names and metadata, the exchange state machine, handler chains,
//! the service registry and the bus/dispatcher traits transports implement.
//!
//! ## Layers
//!
//! ### Foundation
//!
//! - **Names**: qualified names for services, domains and message types ([`QName`])
//! - **Metadata**: operations, patterns and catalogs ([`ServiceOperation`], [`ServiceInterface`])
//! - **Context**: scoped property storage ([`Context`], [`Scope`], [`Property`])
//! - **Messages**: JSON payload plus message context ([`Message`])
//!
//! ### Engine
//!
//! - **Exchange**: phase/state machine of one interaction ([`Exchange`])
//! - **Handlers**: units of behavior and named chains ([`ExchangeHandler`], [`HandlerChain`])
//! - **Transformation and validation**: [`TransformerRegistry`], [`ValidatorRegistry`]
//! - **Domain**: registration and exchange creation ([`ServiceDomain`])
//!
//! ### SPI
//!
//! - **Bus**: transports implement [`ExchangeBus`] and [`Dispatcher`]
//! - **Registry**: [`ServiceRegistry`] with the in-memory [`DefaultServiceRegistry`]
//!
//! ## Message Flow
//!
//! ```text
//! caller ──send──▶ Exchange ──dispatch──▶ Dispatcher ──▶ provider chain
//!                     ▲                                      │
//!                     └───────────── send (reply) ───────────┘
//!                                         │
//!                        Dispatcher ──▶ reply chain ──▶ reply handler
//! ```

pub mod domain;
pub mod error;
pub mod exchange;
pub mod foundation;
pub mod handler;
pub mod service;
pub mod spi;
pub mod transform;
pub mod validate;

pub use domain::{
    FirstRegistered, LastRegistered, ROOT_DOMAIN, ResolutionPolicy, ResolutionStrategy,
    RoundRobin, ServiceDomain,
};
pub use error::{
    BusError, BusResult, ChainError, DomainError, DomainResult, ExchangeError, ExchangeResult,
    HandlerError, HandlerResult, MetadataError, RegistryError, TransformError,
};
pub use exchange::Exchange;
pub use foundation::context::{Context, Property, Scope};
pub use foundation::message::Message;
pub use foundation::metadata::{
    ExchangeContract, ExchangePattern, ExchangePhase, ExchangeState, InvocationMetadata,
    OperationDescriptor, ServiceInterface, ServiceOperation,
};
pub use foundation::qname::{IntoQName, QName};
pub use handler::addressing::AddressingHandler;
pub use handler::chain::{HandlerChain, PROVIDER_HANDLER, REPLY_HANDLER, Slot};
pub use handler::system::{
    PolicyHandler, TransactionHandler, TransformHandler, ValidateHandler, default_chain,
};
pub use handler::traits::{
    BoxedHandler, ExchangeHandler, FnHandler, NoopHandler, handler_fn, handler_fn_with_fault,
};
pub use service::{Policy, Service, ServiceId, ServiceReference};
pub use spi::bus::{BoxedBus, BoxedDispatcher, BusConfig, DispatchChannel, Dispatcher, ExchangeBus};
pub use spi::delivery::{deliver_input, deliver_output};
pub use spi::registry::{
    DefaultServiceRegistry, RegistryStats, ServiceRegistration, ServiceRegistry,
};
pub use transform::{
    BoxedTransformer, TransformSequence, Transformer, TransformerRegistry, transformer_fn,
};
pub use validate::{BoxedValidator, Validator, ValidatorRegistry, validator_fn};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BoxedHandler, Exchange, ExchangeHandler, ExchangePattern, ExchangePhase, ExchangeState,
        HandlerError, HandlerResult, Message, QName, Scope, ServiceDomain, ServiceInterface,
        ServiceOperation, ServiceReference, handler_fn, handler_fn_with_fault,
    };
}
