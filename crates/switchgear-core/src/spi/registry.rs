//! Service registry contract and the default in-memory registry.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::foundation::qname::QName;
use crate::service::Service;
use crate::spi::bus::BoxedDispatcher;

/// Binding of a service to its dispatcher.
#[derive(Clone)]
pub struct ServiceRegistration {
    /// The registered service.
    pub service: Service,
    /// Dispatcher delivering to the service.
    pub dispatcher: BoxedDispatcher,
    /// Domain that registered it.
    pub domain: QName,
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service", &self.service)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Tracks which services are bound to which dispatcher.
pub trait ServiceRegistry: Send + Sync {
    /// Provider name, as used in configuration.
    fn name(&self) -> &str;

    /// Records the binding of `service` to `dispatcher`.
    fn register_service(
        &self,
        service: Service,
        dispatcher: BoxedDispatcher,
        domain: &QName,
    ) -> Result<Service, RegistryError>;

    /// Services registered under `name`, in registration order.
    fn services(&self, name: &QName) -> Vec<Service>;

    /// Removes a registration.
    fn unregister_service(&self, service: &Service) -> Result<(), RegistryError>;

    /// Every registered service.
    fn all_services(&self) -> Vec<Service>;

    /// Returns `true` if `service` is currently registered.
    fn contains(&self, service: &Service) -> bool {
        self.services(service.name()).contains(service)
    }
}

/// Summary of a registry's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Distinct service names.
    pub names: usize,
    /// Registrations across all names.
    pub registrations: usize,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} service names, {} registrations",
            self.names, self.registrations
        )
    }
}

/// In-memory registry keyed by service name.
#[derive(Default)]
pub struct DefaultServiceRegistry {
    services: RwLock<HashMap<QName, Vec<ServiceRegistration>>>,
}

impl DefaultServiceRegistry {
    /// Provider name of this registry.
    pub const NAME: &'static str = "default";

    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations under `name`, in registration order.
    pub fn registrations(&self, name: &QName) -> Vec<ServiceRegistration> {
        self.services.read().get(name).cloned().unwrap_or_default()
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> RegistryStats {
        let services = self.services.read();
        RegistryStats {
            names: services.len(),
            registrations: services.values().map(Vec::len).sum(),
        }
    }
}

impl ServiceRegistry for DefaultServiceRegistry {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn register_service(
        &self,
        service: Service,
        dispatcher: BoxedDispatcher,
        domain: &QName,
    ) -> Result<Service, RegistryError> {
        let mut services = self.services.write();
        let entries = services.entry(service.name().clone()).or_default();
        if entries.iter().any(|r| r.service == service) {
            return Err(RegistryError::AlreadyRegistered(service.name().to_string()));
        }
        entries.push(ServiceRegistration {
            service: service.clone(),
            dispatcher,
            domain: domain.clone(),
        });
        info!(
            service = %service.name(),
            service_id = %service.id(),
            domain = %domain,
            "Registered service"
        );
        Ok(service)
    }

    fn services(&self, name: &QName) -> Vec<Service> {
        self.services
            .read()
            .get(name)
            .map(|entries| entries.iter().map(|r| r.service.clone()).collect())
            .unwrap_or_default()
    }

    fn unregister_service(&self, service: &Service) -> Result<(), RegistryError> {
        let mut services = self.services.write();
        let not_registered = || RegistryError::NotRegistered(service.name().to_string());
        let entries = services.get_mut(service.name()).ok_or_else(not_registered)?;
        let before = entries.len();
        entries.retain(|r| &r.service != service);
        if entries.len() == before {
            return Err(not_registered());
        }
        if entries.is_empty() {
            services.remove(service.name());
        }
        debug!(service = %service.name(), service_id = %service.id(), "Unregistered service");
        Ok(())
    }

    fn all_services(&self) -> Vec<Service> {
        self.services
            .read()
            .values()
            .flat_map(|entries| entries.iter().map(|r| r.service.clone()))
            .collect()
    }
}

impl fmt::Debug for DefaultServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultServiceRegistry")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusResult;
    use crate::exchange::Exchange;
    use crate::foundation::metadata::ServiceInterface;
    use crate::spi::bus::{DispatchChannel, Dispatcher};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct IdleDispatcher(Service);

    #[async_trait]
    impl Dispatcher for IdleDispatcher {
        fn service(&self) -> &Service {
            &self.0
        }

        fn channels(&self) -> &[DispatchChannel] {
            &[DispatchChannel::Input]
        }

        fn start(&self) -> BusResult<()> {
            Ok(())
        }

        fn stop(&self) -> BusResult<()> {
            Ok(())
        }

        fn is_running(&self) -> bool {
            false
        }

        async fn dispatch(&self, _exchange: Exchange) -> BusResult<()> {
            Ok(())
        }
    }

    fn qn(s: &str) -> QName {
        QName::parse(s).unwrap()
    }

    fn service(name: &str) -> Service {
        Service::new(qn(name), ServiceInterface::default(), vec![], qn("d"))
    }

    fn register(registry: &DefaultServiceRegistry, service: &Service) -> Result<Service, RegistryError> {
        registry.register_service(
            service.clone(),
            Arc::new(IdleDispatcher(service.clone())),
            &qn("d"),
        )
    }

    #[test]
    fn test_services_keep_registration_order() {
        let registry = DefaultServiceRegistry::new();
        let first = service("S");
        let second = service("S");
        let other = service("Other");
        for s in [&first, &second, &other] {
            register(&registry, s).unwrap();
        }

        assert_eq!(registry.services(&qn("S")), vec![first.clone(), second.clone()]);
        assert!(registry.services(&qn("Missing")).is_empty());
        assert_eq!(registry.all_services().len(), 3);
        assert_eq!(
            registry.stats(),
            RegistryStats {
                names: 2,
                registrations: 3
            }
        );
        assert_eq!(registry.registrations(&qn("S"))[1].domain, qn("d"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = DefaultServiceRegistry::new();
        let s = service("S");
        register(&registry, &s).unwrap();
        assert_eq!(
            register(&registry, &s).unwrap_err(),
            RegistryError::AlreadyRegistered("S".into())
        );
    }

    #[test]
    fn test_unregister() {
        let registry = DefaultServiceRegistry::new();
        let a = service("S");
        let b = service("S");
        register(&registry, &a).unwrap();
        register(&registry, &b).unwrap();

        registry.unregister_service(&a).unwrap();
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));
        assert_eq!(
            registry.unregister_service(&a).unwrap_err(),
            RegistryError::NotRegistered("S".into())
        );

        registry.unregister_service(&b).unwrap();
        assert_eq!(registry.stats().names, 0);
    }
}
