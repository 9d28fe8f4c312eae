//! # Switchgear
//!
//! An in-process service bus: components exchange one-way or request/reply
//! messages through service domains without knowing each other's transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  create_exchange  ┌───────────────┐  dispatch  ┌────────────┐
//! │  caller  │──────────────────▶│ ServiceDomain │───────────▶│ Dispatcher │──▶ provider chain
//! └──────────┘                   │  + registry   │            │ (bus)      │
//!       ▲                        └───────────────┘            └────────────┘
//!       └──────────────────── reply chain ◀─────────────────────────┘
//! ```
//!
//! - **Runtime**: loads configuration and owns the service domains
//! - **ServiceDomain**: registers services and creates exchanges
//! - **Exchange**: phase/state machine of one interaction
//! - **HandlerChain**: policy, validation, transformation and transaction
//!   handlers wrapped around the provider
//! - **ExchangeBus**: pluggable delivery (`local` inline, `queue` tokio queues)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchgear::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::builder().build()?;
//!     let domain = runtime.domain(ROOT_DOMAIN)?;
//!
//!     domain.register_service("Echo", None, handler_fn(|exchange: Exchange| async move {
//!         if let Some(message) = exchange.message() {
//!             exchange.send(Message::new(message.into_body())).await?;
//!         }
//!         Ok(())
//!     }))?;
//!
//!     let reference = domain.register_service_reference("Echo", None, None)?;
//!     let exchange = domain.create_exchange(&reference, "process", Some(reply_handler))?;
//!     exchange.send(Message::new("hello")).await?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `switchgear.toml` configuration files
//! - `yaml-config`: `switchgear.yaml` configuration files
//! - `json-log`: JSON log output

pub use switchgear_core as core;
pub use switchgear_runtime as runtime;
pub use switchgear_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use switchgear_runtime::{DomainConfig, Runtime, SwitchgearConfig};

    // Domain, exchange and messages
    pub use switchgear_core::{
        Exchange, ExchangePattern, ExchangePhase, ExchangeState, Message, QName, ROOT_DOMAIN,
        Scope, ServiceDomain, ServiceInterface, ServiceOperation, ServiceReference,
    };

    // Handlers
    pub use switchgear_core::{
        BoxedHandler, ExchangeHandler, HandlerChain, HandlerError, HandlerResult, handler_fn,
        handler_fn_with_fault,
    };

    // Transformation and validation
    pub use switchgear_core::{transformer_fn, validator_fn};
}
