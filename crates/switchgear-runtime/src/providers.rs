//! Named factories for exchange buses and service registries.
//!
//! A domain configuration names its providers (`bus = "queue"`,
//! `registry = "default"`); the runtime resolves those names here. The
//! process-wide table is installed once at startup with [`install`] and read
//! through [`global`]; until then `global` returns the built-in defaults.
//!
//! ```rust,ignore
//! let mut providers = ProviderRegistry::with_defaults();
//! providers.register_bus("journal", || Arc::new(JournalBus::new()) as BoxedBus);
//! providers::install(providers).map_err(|_| "providers already installed")?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use switchgear_core::{BoxedBus, DefaultServiceRegistry, ServiceRegistry};
use switchgear_transport::{LocalExchangeBus, QueueExchangeBus};

/// Creates a fresh, uninitialized bus.
pub type BusFactory = Arc<dyn Fn() -> BoxedBus + Send + Sync>;

/// Creates a fresh, empty registry.
pub type RegistryFactory = Arc<dyn Fn() -> Arc<dyn ServiceRegistry> + Send + Sync>;

static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

/// Installs the process-wide provider table.
///
/// Fails, handing the table back, if one is already installed or
/// [`global`] has already been read.
pub fn install(providers: ProviderRegistry) -> Result<(), ProviderRegistry> {
    GLOBAL.set(providers)
}

/// The process-wide provider table.
pub fn global() -> &'static ProviderRegistry {
    GLOBAL.get_or_init(ProviderRegistry::with_defaults)
}

/// Name → factory tables for buses and registries.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    buses: HashMap<String, BusFactory>,
    registries: HashMap<String, RegistryFactory>,
}

impl ProviderRegistry {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// `local` and `queue` buses plus the `default` registry.
    pub fn with_defaults() -> Self {
        let mut providers = Self::new();
        providers
            .register_bus(LocalExchangeBus::NAME, || Arc::new(LocalExchangeBus::new()) as BoxedBus)
            .register_bus(QueueExchangeBus::NAME, || Arc::new(QueueExchangeBus::new()) as BoxedBus)
            .register_registry(DefaultServiceRegistry::NAME, || {
                Arc::new(DefaultServiceRegistry::new()) as Arc<dyn ServiceRegistry>
            });
        providers
    }

    /// Registers a bus factory, replacing any previous one of that name.
    pub fn register_bus<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> BoxedBus + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(provider = %name, "Registered exchange bus provider");
        self.buses.insert(name, Arc::new(factory));
        self
    }

    /// Registers a registry factory, replacing any previous one of that name.
    pub fn register_registry<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn ServiceRegistry> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(provider = %name, "Registered service registry provider");
        self.registries.insert(name, Arc::new(factory));
        self
    }

    /// Creates a bus from the named provider.
    pub fn bus(&self, name: &str) -> Option<BoxedBus> {
        self.buses.get(name).map(|factory| factory())
    }

    /// Creates a registry from the named provider.
    pub fn registry(&self, name: &str) -> Option<Arc<dyn ServiceRegistry>> {
        self.registries.get(name).map(|factory| factory())
    }

    /// Registered bus provider names, sorted.
    pub fn bus_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.buses.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered registry provider names, sorted.
    pub fn registry_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.registries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("buses", &self.bus_names())
            .field("registries", &self.registry_names())
            .finish()
    }
}
