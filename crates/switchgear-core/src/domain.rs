//! The service domain.
//!
//! A [`ServiceDomain`] is the entry point for one isolated namespace of
//! services. It owns the default handler chain template and wires every
//! registration through the configured [`ExchangeBus`](crate::spi::bus::ExchangeBus)
//! and [`ServiceRegistry`].
//!
//! # Registration
//!
//! ```text
//! register_service(name, interface, provider)
//!   ├─ Service::new(..)
//!   ├─ chain = default_chain.copy(); chain.replace("provider", provider)
//!   ├─ dispatcher = bus.create_dispatcher(service, chain)
//!   └─ registry.register_service(service, dispatcher, domain)
//! ```
//!
//! Registration and unregistration are serialized per domain. The first
//! registration seals the default chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BusError, DomainError, DomainResult};
use crate::exchange::Exchange;
use crate::foundation::metadata::{ExchangeContract, InvocationMetadata, ServiceInterface};
use crate::foundation::qname::{IntoQName, QName};
use crate::handler::chain::{HandlerChain, PROVIDER_HANDLER, REPLY_HANDLER};
use crate::handler::system::default_chain;
use crate::handler::traits::BoxedHandler;
use crate::service::{Policy, Service, ServiceReference};
use crate::spi::bus::BoxedBus;
use crate::spi::registry::ServiceRegistry;
use crate::transform::TransformerRegistry;
use crate::validate::ValidatorRegistry;

/// Name of the domain created when none is configured.
pub const ROOT_DOMAIN: &str = "org.switchgear.domains.root";

// =============================================================================
// Resolution policies
// =============================================================================

/// Picks one service among those sharing a name.
pub trait ResolutionPolicy: Send + Sync {
    /// Selects from `candidates`, which are in registration order.
    fn select(&self, candidates: &[Service]) -> Option<Service>;
}

/// Always picks the earliest registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstRegistered;

impl ResolutionPolicy for FirstRegistered {
    fn select(&self, candidates: &[Service]) -> Option<Service> {
        candidates.first().cloned()
    }
}

/// Always picks the latest registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastRegistered;

impl ResolutionPolicy for LastRegistered {
    fn select(&self, candidates: &[Service]) -> Option<Service> {
        candidates.last().cloned()
    }
}

/// Rotates through the candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl ResolutionPolicy for RoundRobin {
    fn select(&self, candidates: &[Service]) -> Option<Service> {
        if candidates.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(i).cloned()
    }
}

/// Configurable choice of [`ResolutionPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// [`FirstRegistered`].
    #[default]
    FirstRegistered,
    /// [`LastRegistered`].
    LastRegistered,
    /// [`RoundRobin`].
    RoundRobin,
}

impl ResolutionStrategy {
    /// Builds the policy.
    pub fn into_policy(self) -> Arc<dyn ResolutionPolicy> {
        match self {
            Self::FirstRegistered => Arc::new(FirstRegistered),
            Self::LastRegistered => Arc::new(LastRegistered),
            Self::RoundRobin => Arc::new(RoundRobin::default()),
        }
    }
}

// =============================================================================
// ServiceDomain
// =============================================================================

/// An isolated namespace of services and references.
pub struct ServiceDomain {
    name: QName,
    registry: Arc<dyn ServiceRegistry>,
    bus: BoxedBus,
    transformers: Arc<TransformerRegistry>,
    validators: Arc<ValidatorRegistry>,
    resolution: Arc<dyn ResolutionPolicy>,
    default_chain: RwLock<HandlerChain>,
    sealed: AtomicBool,
    references: RwLock<HashMap<QName, ServiceReference>>,
    registration: Mutex<()>,
}

impl ServiceDomain {
    /// Creates a domain and assembles its default chain.
    ///
    /// `bus` is expected to be initialized for this domain already.
    pub fn new(
        name: QName,
        registry: Arc<dyn ServiceRegistry>,
        bus: BoxedBus,
        transformers: Arc<TransformerRegistry>,
        validators: Arc<ValidatorRegistry>,
    ) -> Self {
        let chain = default_chain(transformers.clone(), validators.clone());
        debug!(domain = %name, bus = bus.name(), registry = registry.name(), "Created service domain");
        Self {
            name,
            registry,
            bus,
            transformers,
            validators,
            resolution: Arc::new(FirstRegistered),
            default_chain: RwLock::new(chain),
            sealed: AtomicBool::new(false),
            references: RwLock::new(HashMap::new()),
            registration: Mutex::new(()),
        }
    }

    /// Replaces the resolution policy.
    pub fn with_resolution_policy(mut self, policy: Arc<dyn ResolutionPolicy>) -> Self {
        self.resolution = policy;
        self
    }

    /// Domain name.
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// The bus dispatchers are created on.
    pub fn bus(&self) -> &BoxedBus {
        &self.bus
    }

    /// The service registry.
    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// Domain-wide transformers.
    pub fn transformers(&self) -> &Arc<TransformerRegistry> {
        &self.transformers
    }

    /// Domain-wide validators.
    pub fn validators(&self) -> &Arc<ValidatorRegistry> {
        &self.validators
    }

    /// A snapshot of the default chain template.
    pub fn default_chain(&self) -> HandlerChain {
        self.default_chain.read().copy()
    }

    /// Returns `true` once a service has been registered.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Edits the default chain template.
    ///
    /// Only allowed before the first service registration.
    pub fn configure_default_chain<F>(&self, f: F) -> DomainResult<()>
    where
        F: FnOnce(&mut HandlerChain) -> DomainResult<()>,
    {
        let _guard = self.registration.lock();
        if self.is_sealed() {
            return Err(DomainError::ChainSealed);
        }
        let mut chain = self.default_chain.write();
        let mut edited = chain.copy();
        f(&mut edited)?;
        *chain = edited;
        Ok(())
    }

    /// Registers a provider with no policy requirements.
    ///
    /// `None` for the interface registers the default request/reply catalog.
    pub fn register_service(
        &self,
        name: impl IntoQName,
        interface: Option<ServiceInterface>,
        provider: BoxedHandler,
    ) -> DomainResult<Service> {
        self.register_service_with_policies(name, interface, provider, Vec::new())
    }

    /// Registers a provider with policy requirements.
    pub fn register_service_with_policies(
        &self,
        name: impl IntoQName,
        interface: Option<ServiceInterface>,
        provider: BoxedHandler,
        policies: Vec<Policy>,
    ) -> DomainResult<Service> {
        let name = name.into_qname()?;
        let interface = interface.unwrap_or_else(ServiceInterface::default_in_out);

        let _guard = self.registration.lock();
        let service = Service::new(name, interface, policies, self.name.clone());

        let mut chain = self.default_chain.read().copy();
        chain.replace(PROVIDER_HANDLER, provider)?;

        let dispatcher = self.bus.create_dispatcher(&service, chain)?;
        if let Err(e) = self
            .registry
            .register_service(service.clone(), dispatcher, &self.name)
        {
            if let Err(cleanup) = self.bus.remove_dispatcher(&service) {
                warn!(service = %service.name(), error = %cleanup, "Failed to remove dispatcher");
            }
            return Err(e.into());
        }
        self.sealed.store(true, Ordering::Release);

        info!(
            domain = %self.name,
            service = %service.name(),
            service_id = %service.id(),
            operations = service.interface().len(),
            "Service registered"
        );
        Ok(service)
    }

    /// Removes a registration and its dispatcher.
    pub fn unregister_service(&self, service: &Service) -> DomainResult<()> {
        let _guard = self.registration.lock();
        self.registry.unregister_service(service)?;
        self.bus.remove_dispatcher(service)?;
        info!(domain = %self.name, service = %service.name(), "Service unregistered");
        Ok(())
    }

    /// Services registered under `name`, in registration order.
    pub fn services(&self, name: &QName) -> Vec<Service> {
        self.registry.services(name)
    }

    /// Records a caller-side reference. The name need not be registered yet.
    pub fn register_service_reference(
        &self,
        name: impl IntoQName,
        interface: Option<ServiceInterface>,
        reply_handler: Option<BoxedHandler>,
    ) -> DomainResult<ServiceReference> {
        let name = name.into_qname()?;
        let mut reference =
            ServiceReference::new(name.clone(), interface.unwrap_or_else(ServiceInterface::default_in_out));
        if let Some(handler) = reply_handler {
            reference = reference.with_reply_handler(handler);
        }
        self.references.write().insert(name.clone(), reference.clone());
        debug!(domain = %self.name, reference = %name, "Service reference registered");
        Ok(reference)
    }

    /// Looks up a recorded reference.
    pub fn service_reference(&self, name: &QName) -> Option<ServiceReference> {
        self.references.read().get(name).cloned()
    }

    /// Creates an exchange for `operation` on the service behind `reference`.
    ///
    /// `reply_handler` falls back to the reference's own handler. A reply
    /// handler is mandatory for request/reply operations.
    pub fn create_exchange(
        &self,
        reference: &ServiceReference,
        operation: &str,
        reply_handler: Option<BoxedHandler>,
    ) -> DomainResult<Exchange> {
        let candidates = self.registry.services(reference.name());
        let target = self
            .resolution
            .select(&candidates)
            .ok_or_else(|| DomainError::NoServiceFound(reference.name().to_string()))?;
        let dispatcher = self
            .bus
            .get_dispatcher(&target)
            .ok_or_else(|| BusError::NotRunning(target.name().to_string()))?;

        let reply_chain = match reply_handler.or_else(|| reference.reply_handler().cloned()) {
            Some(handler) => {
                let mut chain = self.default_chain.read().copy();
                chain.add_last(REPLY_HANDLER, handler)?;
                Some(chain)
            }
            None => None,
        };

        let contract = ExchangeContract::new(
            operation,
            reference
                .interface()
                .operation(operation)
                .map(InvocationMetadata::from),
            target.interface().operation(operation).cloned(),
        );
        Ok(Exchange::new(reference.clone(), contract, dispatcher, reply_chain)?)
    }
}

impl fmt::Debug for ServiceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDomain")
            .field("name", &self.name)
            .field("bus", &self.bus.name())
            .field("registry", &self.registry.name())
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}
