//! Configuration module for the Switchgear runtime.
//!
//! Layered loading (figment), the configuration schema for logging and
//! service domains, and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DomainConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
    SwitchgearConfig,
};
pub use validation::validate_config;
