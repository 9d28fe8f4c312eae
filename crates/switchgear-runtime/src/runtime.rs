//! Domain lifecycle orchestration.
//!
//! The runtime turns configuration into live service domains: for each
//! [`DomainConfig`] it creates the named bus and registry from the
//! [`ProviderRegistry`], initializes the bus with the domain's properties and
//! builds the [`ServiceDomain`] on top.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchgear_runtime::Runtime;
//!
//! // switchgear.toml from the current directory, SWITCHGEAR_* overrides
//! let runtime = Runtime::builder().build()?;
//!
//! let domain = runtime.domain(ROOT_DOMAIN)?;
//! domain.register_service("Greeter", None, greeter)?;
//!
//! runtime.run().await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::signal;
use tracing::{error, info, warn};

use switchgear_core::{IntoQName, QName, ServiceDomain, TransformerRegistry, ValidatorRegistry};

use crate::config::{ConfigError, ConfigLoader, DomainConfig, SwitchgearConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::providers::{self, ProviderRegistry};

/// Owns the service domains of one process.
pub struct Runtime {
    config: SwitchgearConfig,
    providers: ProviderRegistry,
    domains: RwLock<HashMap<QName, Arc<ServiceDomain>>>,
}

impl Runtime {
    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration using the process-wide providers.
    ///
    /// Initializes logging, then creates every configured domain.
    pub fn from_config(config: &SwitchgearConfig) -> RuntimeResult<Self> {
        Self::with_providers(config, providers::global().clone())
    }

    /// Creates a runtime from configuration using an explicit provider table.
    pub fn with_providers(
        config: &SwitchgearConfig,
        providers: ProviderRegistry,
    ) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        let runtime = Self {
            config: config.clone(),
            providers,
            domains: RwLock::new(HashMap::new()),
        };
        for domain in &config.domains {
            if let Err(e) = runtime.create_domain(domain) {
                runtime.shutdown_quietly();
                return Err(e);
            }
        }

        info!(
            log_level = %config.logging.level,
            domains = config.domains.len(),
            "Runtime initialized from configuration"
        );
        Ok(runtime)
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SwitchgearConfig {
        &self.config
    }

    /// The provider table domains are created from.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Creates and initializes one domain.
    pub fn create_domain(&self, config: &DomainConfig) -> RuntimeResult<Arc<ServiceDomain>> {
        let name = QName::parse(&config.name)
            .map_err(|e| ConfigError::invalid_name(&config.name, e.to_string()))?;

        let mut domains = self.domains.write();
        if domains.contains_key(&name) {
            return Err(RuntimeError::DomainExists(name.to_string()));
        }

        let bus = self
            .providers
            .bus(&config.bus)
            .ok_or_else(|| RuntimeError::UnknownBus(config.bus.clone()))?;
        let registry = self
            .providers
            .registry(&config.registry)
            .ok_or_else(|| RuntimeError::UnknownRegistry(config.registry.clone()))?;
        bus.init(&name, &config.properties)?;

        let domain = Arc::new(
            ServiceDomain::new(
                name.clone(),
                registry,
                bus,
                Arc::new(TransformerRegistry::new()),
                Arc::new(ValidatorRegistry::new()),
            )
            .with_resolution_policy(config.resolution.into_policy()),
        );
        domains.insert(name.clone(), domain.clone());

        info!(
            domain = %name,
            bus = %config.bus,
            registry = %config.registry,
            resolution = ?config.resolution,
            "Domain created"
        );
        Ok(domain)
    }

    /// Looks up a domain by name.
    pub fn domain(&self, name: impl IntoQName) -> RuntimeResult<Arc<ServiceDomain>> {
        let name = name
            .into_qname()
            .map_err(|e| RuntimeError::Domain(e.into()))?;
        self.domains
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| RuntimeError::DomainNotFound(name.to_string()))
    }

    /// Names of all live domains, sorted.
    pub fn domain_names(&self) -> Vec<QName> {
        let mut names: Vec<_> = self.domains.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes a domain and destroys its bus, stopping every dispatcher.
    pub fn destroy_domain(&self, name: impl IntoQName) -> RuntimeResult<()> {
        let name = name
            .into_qname()
            .map_err(|e| RuntimeError::Domain(e.into()))?;
        let domain = self
            .domains
            .write()
            .remove(&name)
            .ok_or_else(|| RuntimeError::DomainNotFound(name.to_string()))?;
        domain.bus().destroy()?;
        info!(domain = %name, "Domain destroyed");
        Ok(())
    }

    /// Destroys every domain.
    ///
    /// All buses are destroyed even if some fail; the first failure is returned.
    pub fn shutdown(&self) -> RuntimeResult<()> {
        let domains: Vec<_> = self.domains.write().drain().collect();
        let count = domains.len();
        let mut first_error = None;

        for (name, domain) in domains {
            if let Err(e) = domain.bus().destroy() {
                error!(domain = %name, error = %e, "Failed to destroy exchange bus");
                first_error.get_or_insert(e);
            }
        }

        info!(domains = count, "Runtime stopped");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn shutdown_quietly(&self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Shutdown after failed startup reported an error");
        }
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Switchgear runtime is running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.shutdown()
    }

    /// Runs until `shutdown` completes, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("domains", &self.domain_names())
            .field("providers", &self.providers)
            .finish()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`Runtime`] from layered configuration.
///
/// ```rust,ignore
/// let runtime = Runtime::builder()
///     .config_file("config/switchgear.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    providers: Option<ProviderRegistry>,
}

impl RuntimeBuilder {
    /// Searches the current directory and the user config directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new()
                .with_current_dir()
                .with_user_config_dir(),
            providers: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SwitchgearConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses this provider table instead of the process-wide one.
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = self.config_loader.load()?;
        match self.providers {
            Some(providers) => Runtime::with_providers(&config, providers),
            None => Runtime::from_config(&config),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::time::Duration;
    use switchgear_core::{
        BoxedHandler, BusError, DomainError, Exchange, ExchangePhase, ExchangeState,
        HandlerError, Message, ROOT_DOMAIN, Scope, ServiceInterface, ServiceOperation, handler_fn,
        handler_fn_with_fault,
    };
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const BUSES: [&str; 2] = ["local", "queue"];

    fn qn(s: &str) -> QName {
        QName::parse(s).unwrap()
    }

    fn runtime_on(bus: &str) -> Runtime {
        let config = SwitchgearConfig {
            logging: Default::default(),
            domains: vec![DomainConfig::default().with_bus(bus)],
        };
        Runtime::with_providers(&config, ProviderRegistry::with_defaults()).unwrap()
    }

    fn one_way() -> ServiceInterface {
        ServiceInterface::new([ServiceOperation::one_way("op1", qn("T1"))]).unwrap()
    }

    fn request_reply() -> ServiceInterface {
        ServiceInterface::new([ServiceOperation::request_reply("op2", qn("T1"), qn("T2"))]).unwrap()
    }

    /// Forwards every IN body to `tx`.
    fn observer(tx: mpsc::UnboundedSender<Value>) -> BoxedHandler {
        handler_fn(move |exchange: Exchange| {
            let tx = tx.clone();
            async move {
                let body = exchange.message().map(Message::into_body).unwrap_or_default();
                let _ = tx.send(body);
                Ok(())
            }
        })
    }

    /// Replies "resp" to every IN delivery.
    fn responder() -> BoxedHandler {
        handler_fn(|exchange: Exchange| async move {
            if exchange.phase() == Some(ExchangePhase::In) {
                exchange.send(Message::new("resp")).await?;
            }
            Ok(())
        })
    }

    /// Reports the body and always faults.
    fn exploding(tx: mpsc::UnboundedSender<Value>) -> BoxedHandler {
        handler_fn(move |exchange: Exchange| {
            let tx = tx.clone();
            async move {
                let body = exchange.message().map(Message::into_body).unwrap_or_default();
                let _ = tx.send(body);
                Err(HandlerError::fault("provider exploded"))
            }
        })
    }

    /// Sends `("message", body)` or `("fault", body)` for reply deliveries.
    fn reply_recorder(tx: mpsc::UnboundedSender<(&'static str, Value)>) -> BoxedHandler {
        let on_fault = tx.clone();
        handler_fn_with_fault(
            move |exchange: Exchange| {
                let tx = tx.clone();
                async move {
                    let body = exchange.message().map(Message::into_body).unwrap_or_default();
                    let _ = tx.send(("message", body));
                    Ok(())
                }
            },
            move |exchange: Exchange| {
                let tx = on_fault.clone();
                async move {
                    let body = exchange.message().map(Message::into_body).unwrap_or_default();
                    let _ = tx.send(("fault", body));
                }
            },
        )
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed")
    }

    async fn wait_for_state(exchange: &Exchange, state: ExchangeState) {
        timeout(Duration::from_secs(1), async {
            while exchange.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("exchange never reached the expected state");
    }

    #[tokio::test]
    async fn test_one_way_delivered_once() {
        for bus in BUSES {
            let runtime = runtime_on(bus);
            let domain = runtime.domain(ROOT_DOMAIN).unwrap();
            let (tx, mut rx) = mpsc::unbounded_channel();
            domain.register_service("S", Some(one_way()), observer(tx)).unwrap();

            let reference = domain.register_service_reference("S", Some(one_way()), None).unwrap();
            let exchange = domain.create_exchange(&reference, "op1", None).unwrap();
            exchange.send(Message::new("ping")).await.unwrap();

            assert_eq!(next(&mut rx).await, json!("ping"), "bus {bus}");
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(rx.try_recv().is_err(), "bus {bus} delivered twice");
            assert_eq!(exchange.phase(), Some(ExchangePhase::In));
            assert_eq!(exchange.state(), ExchangeState::Ok);

            runtime.shutdown().unwrap();
        }
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        for bus in BUSES {
            let runtime = runtime_on(bus);
            let domain = runtime.domain(ROOT_DOMAIN).unwrap();
            domain.register_service("S", Some(request_reply()), responder()).unwrap();

            let (tx, mut rx) = mpsc::unbounded_channel();
            let reference = domain
                .register_service_reference("S", Some(request_reply()), None)
                .unwrap();
            let exchange = domain
                .create_exchange(&reference, "op2", Some(reply_recorder(tx)))
                .unwrap();
            exchange.send(Message::new("req")).await.unwrap();

            assert_eq!(next(&mut rx).await, ("message", json!("resp")), "bus {bus}");
            assert_eq!(exchange.phase(), Some(ExchangePhase::Out));
            assert_eq!(exchange.state(), ExchangeState::Ok);

            runtime.shutdown().unwrap();
        }
    }

    #[tokio::test]
    async fn test_provider_fault_reaches_reply_chain() {
        for bus in BUSES {
            let runtime = runtime_on(bus);
            let domain = runtime.domain(ROOT_DOMAIN).unwrap();
            let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
            domain
                .register_service("S", Some(request_reply()), exploding(seen_tx))
                .unwrap();

            let (tx, mut rx) = mpsc::unbounded_channel();
            let reference = domain
                .register_service_reference("S", Some(request_reply()), None)
                .unwrap();
            let exchange = domain
                .create_exchange(&reference, "op2", Some(reply_recorder(tx)))
                .unwrap();
            exchange.send(Message::new("req")).await.unwrap();

            assert_eq!(next(&mut seen_rx).await, json!("req"));
            assert_eq!(
                next(&mut rx).await,
                ("fault", json!({ "error": "provider exploded" })),
                "bus {bus}"
            );
            assert_eq!(exchange.state(), ExchangeState::Fault);
            assert_eq!(exchange.phase(), Some(ExchangePhase::Out));

            runtime.shutdown().unwrap();
        }
    }

    #[tokio::test]
    async fn test_fault_without_reply_chain_is_dropped() {
        for bus in BUSES {
            let runtime = runtime_on(bus);
            let domain = runtime.domain(ROOT_DOMAIN).unwrap();
            let (tx, mut rx) = mpsc::unbounded_channel();
            domain.register_service("S", Some(one_way()), exploding(tx)).unwrap();

            let reference = domain.register_service_reference("S", Some(one_way()), None).unwrap();
            let exchange = domain.create_exchange(&reference, "op1", None).unwrap();

            // nothing escapes to the sender
            exchange.send(Message::new("ping")).await.unwrap();
            assert_eq!(next(&mut rx).await, json!("ping"));
            wait_for_state(&exchange, ExchangeState::Fault).await;
            assert!(exchange.reply_chain().is_none());

            runtime.shutdown().unwrap();
        }
    }

    #[tokio::test]
    async fn test_one_way_fault_reaches_reply_chain() {
        for bus in BUSES {
            let runtime = runtime_on(bus);
            let domain = runtime.domain(ROOT_DOMAIN).unwrap();
            let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
            domain.register_service("S", Some(one_way()), exploding(seen_tx)).unwrap();

            let (tx, mut rx) = mpsc::unbounded_channel();
            let reference = domain.register_service_reference("S", Some(one_way()), None).unwrap();
            let exchange = domain
                .create_exchange(&reference, "op1", Some(reply_recorder(tx)))
                .unwrap();
            exchange.send(Message::new("ping")).await.unwrap();

            assert_eq!(next(&mut seen_rx).await, json!("ping"));
            assert_eq!(
                next(&mut rx).await,
                ("fault", json!({ "error": "provider exploded" })),
                "bus {bus}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(rx.try_recv().is_err(), "bus {bus} delivered the fault twice");
            assert_eq!(exchange.state(), ExchangeState::Fault);

            runtime.shutdown().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_round_trips_stay_isolated() {
        const EXCHANGES: usize = 200;

        for bus in BUSES {
            let runtime = runtime_on(bus);
            let domain = runtime.domain(ROOT_DOMAIN).unwrap();

            // Echoes the request and stamps it into the exchange context.
            let echo = handler_fn(|exchange: Exchange| async move {
                if exchange.phase() == Some(ExchangePhase::In) {
                    let body = exchange.message().map(Message::into_body).unwrap_or_default();
                    exchange.set_property("echo.request", body.clone(), Scope::Exchange);
                    tokio::task::yield_now().await;
                    exchange.send(Message::new(body)).await?;
                }
                Ok(())
            });
            domain.register_service("Echo", Some(request_reply()), echo).unwrap();
            let reference = domain
                .register_service_reference("Echo", Some(request_reply()), None)
                .unwrap();

            let tasks: Vec<_> = (0..EXCHANGES)
                .map(|_| {
                    let domain = domain.clone();
                    let reference = reference.clone();
                    tokio::spawn(async move {
                        let (tx, mut rx) = mpsc::unbounded_channel();
                        let exchange = domain
                            .create_exchange(&reference, "op2", Some(reply_recorder(tx)))
                            .unwrap();
                        exchange.send(Message::new(exchange.id())).await.unwrap();

                        let (kind, body) = next(&mut rx).await;
                        let stamped = exchange
                            .property("echo.request", Scope::Exchange)
                            .map(|p| p.value().clone());
                        (exchange.id().to_string(), kind, body, stamped)
                    })
                })
                .collect();

            let mut matched = 0;
            for task in tasks {
                let (id, kind, body, stamped) = task.await.unwrap();
                assert_eq!(kind, "message", "bus {bus}");
                assert_eq!(body, json!(id), "bus {bus}");
                assert_eq!(stamped, Some(json!(id)), "bus {bus}");
                matched += 1;
            }
            assert_eq!(matched, EXCHANGES);

            runtime.shutdown().unwrap();
        }
    }

    #[tokio::test]
    async fn test_domain_lifecycle() {
        let runtime = runtime_on("local");
        let orders = runtime
            .create_domain(&DomainConfig::named("{urn:acme}orders").with_bus("queue"))
            .unwrap();
        assert_eq!(orders.bus().name(), "queue");
        assert_eq!(runtime.domain_names(), vec![qn(ROOT_DOMAIN), qn("{urn:acme}orders")]);

        let err = runtime
            .create_domain(&DomainConfig::named("{urn:acme}orders"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DomainExists(name) if name == "{urn:acme}orders"));

        runtime.destroy_domain("{urn:acme}orders").unwrap();
        assert!(!orders.bus().is_initialized());
        assert!(matches!(
            runtime.domain("{urn:acme}orders"),
            Err(RuntimeError::DomainNotFound(_))
        ));
        assert!(matches!(
            runtime.destroy_domain("{urn:acme}orders"),
            Err(RuntimeError::DomainNotFound(_))
        ));
        assert!(matches!(
            runtime.domain("not a name"),
            Err(RuntimeError::Domain(DomainError::Metadata(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_providers() {
        let runtime = runtime_on("local");
        let err = runtime
            .create_domain(&DomainConfig::named("a").with_bus("journal"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownBus(name) if name == "journal"));

        let mut config = DomainConfig::named("b");
        config.registry = "ldap".to_string();
        let err = runtime.create_domain(&config).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownRegistry(name) if name == "ldap"));

        assert_eq!(runtime.domain_names(), vec![qn(ROOT_DOMAIN)]);
    }

    #[tokio::test]
    async fn test_startup_failure_releases_created_domains() {
        let config = SwitchgearConfig {
            logging: Default::default(),
            domains: vec![
                DomainConfig::named("first"),
                DomainConfig::named("second").with_bus("journal"),
            ],
        };
        let err = Runtime::with_providers(&config, ProviderRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownBus(_)));
    }

    #[tokio::test]
    async fn test_shutdown_destroys_every_bus() {
        let runtime = runtime_on("queue");
        let root = runtime.domain(ROOT_DOMAIN).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let service = root.register_service("S", Some(one_way()), observer(tx)).unwrap();
        let dispatcher = root.bus().get_dispatcher(&service).unwrap();
        assert!(dispatcher.is_running());

        runtime.run_until(async {}).await.unwrap();
        assert!(!dispatcher.is_running());
        assert!(!root.bus().is_initialized());
        assert!(runtime.domain_names().is_empty());

        // a destroyed bus refuses new registrations
        let err = root.register_service("T", Some(one_way()), responder()).unwrap_err();
        assert!(matches!(err, DomainError::Bus(BusError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_bus_properties_reach_init() {
        let runtime = runtime_on("local");
        let domain = runtime
            .create_domain(
                &DomainConfig::named("drained")
                    .with_bus("queue")
                    .with_property("queue.drain-on-stop", "true"),
            )
            .unwrap();
        assert!(domain.bus().is_initialized());
        assert!(matches!(
            domain.bus().init(domain.name(), &Default::default()),
            Err(BusError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_builder_uses_programmatic_config() {
        let mut overrides = SwitchgearConfig::default();
        overrides.domains = vec![DomainConfig::named("{urn:acme}billing")];

        let runtime = Runtime::builder()
            .search_path(std::env::temp_dir().join("switchgear-runtime-builder-none"))
            .without_env()
            .merge(overrides)
            .providers(ProviderRegistry::with_defaults())
            .build()
            .unwrap();
        assert_eq!(runtime.domain_names(), vec![qn("{urn:acme}billing")]);
        runtime.shutdown().unwrap();
    }
}
