//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use switchgear_core::{BusConfig, DefaultServiceRegistry, ROOT_DOMAIN, ResolutionStrategy};
use switchgear_transport::LocalExchangeBus;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchgearConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Service domains created at startup.
    #[serde(default = "default_domains")]
    pub domains: Vec<DomainConfig>,
}

impl Default for SwitchgearConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            domains: default_domains(),
        }
    }
}

fn default_domains() -> Vec<DomainConfig> {
    vec![DomainConfig::default()]
}

// =============================================================================
// Domains
// =============================================================================

/// One service domain and the providers backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain name, a qualified name unique within the runtime.
    #[serde(default = "default_domain_name")]
    pub name: String,

    /// Exchange bus provider name.
    #[serde(default = "default_bus")]
    pub bus: String,

    /// Service registry provider name.
    #[serde(default = "default_registry")]
    pub registry: String,

    /// How a reference picks among several providers of one name.
    #[serde(default)]
    pub resolution: ResolutionStrategy,

    /// Passed verbatim to the bus on `init`.
    #[serde(default)]
    pub properties: BusConfig,
}

impl DomainConfig {
    /// A domain with default providers.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Selects the bus provider.
    pub fn with_bus(mut self, bus: impl Into<String>) -> Self {
        self.bus = bus.into();
        self
    }

    /// Adds one bus property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: default_domain_name(),
            bus: default_bus(),
            registry: default_registry(),
            resolution: ResolutionStrategy::default(),
            properties: BusConfig::new(),
        }
    }
}

fn default_domain_name() -> String {
    ROOT_DOMAIN.to_string()
}

fn default_bus() -> String {
    LocalExchangeBus::NAME.to_string()
}

fn default_registry() -> String {
    DefaultServiceRegistry::NAME.to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target levels, e.g. `switchgear_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
