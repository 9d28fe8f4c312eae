//! Switchgear Runtime - configuration and lifecycle for the Switchgear service bus.
//!
//! This crate provides:
//! - Layered configuration loading with figment (`SwitchgearConfig`, `ConfigLoader`)
//! - Logging setup on `tracing-subscriber` (`LoggingBuilder`)
//! - Named bus and registry providers (`ProviderRegistry`)
//! - Domain lifecycle management (`Runtime`)
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [[domains]]
//! name = "{urn:acme}orders"
//! bus = "queue"
//! resolution = "round-robin"
//!
//! [domains.properties]
//! "queue.drain-on-stop" = "true"
//! ```
//!
//! ```rust,ignore
//! use switchgear_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::builder().build()?;
//!     let orders = runtime.domain("{urn:acme}orders")?;
//!     orders.register_service("Fulfilment", None, fulfilment_handler())?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod providers;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, DomainConfig, LoggingConfig, SwitchgearConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use providers::{BusFactory, ProviderRegistry, RegistryFactory};
pub use runtime::{Runtime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
