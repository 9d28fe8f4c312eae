//! Lifecycle bookkeeping shared by the bus implementations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use switchgear_core::{BusConfig, BusError, BusResult, Dispatcher, QName, Service, ServiceId};

struct Binding {
    domain: QName,
    config: BusConfig,
}

/// Init/destroy guards plus the dispatcher table of one bus.
pub(crate) struct BusState<D> {
    name: &'static str,
    binding: RwLock<Option<Binding>>,
    dispatchers: Mutex<HashMap<ServiceId, Arc<D>>>,
}

impl<D: Dispatcher> BusState<D> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            binding: RwLock::new(None),
            dispatchers: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn init(&self, domain: &QName, config: &BusConfig) -> BusResult<()> {
        let mut binding = self.binding.write();
        if binding.is_some() {
            return Err(BusError::AlreadyInitialized(self.name.to_string()));
        }
        *binding = Some(Binding {
            domain: domain.clone(),
            config: config.clone(),
        });
        info!(bus = self.name, domain = %domain, properties = config.len(), "Exchange bus initialized");
        Ok(())
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.binding.read().is_some()
    }

    pub(crate) fn ensure_initialized(&self) -> BusResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BusError::NotInitialized(self.name.to_string()))
        }
    }

    /// Domain the bus was initialized for.
    pub(crate) fn domain(&self) -> Option<QName> {
        self.binding.read().as_ref().map(|b| b.domain.clone())
    }

    /// Reads one configuration property.
    pub(crate) fn property(&self, key: &str) -> Option<String> {
        self.binding
            .read()
            .as_ref()
            .and_then(|b| b.config.get(key).cloned())
    }

    /// Starts `dispatcher` and records it for `service`.
    pub(crate) fn attach(&self, service: &Service, dispatcher: Arc<D>) -> BusResult<Arc<D>> {
        self.ensure_initialized()?;
        dispatcher.start()?;
        let previous = self
            .dispatchers
            .lock()
            .insert(service.id(), dispatcher.clone());
        if let Some(previous) = previous
            && let Err(e) = previous.stop()
        {
            warn!(bus = self.name, service = %service.name(), error = %e, "Failed to stop replaced dispatcher");
        }
        debug!(bus = self.name, service = %service.name(), service_id = %service.id(), "Dispatcher created");
        Ok(dispatcher)
    }

    pub(crate) fn get(&self, service: &Service) -> Option<Arc<D>> {
        self.dispatchers.lock().get(&service.id()).cloned()
    }

    pub(crate) fn remove(&self, service: &Service) -> BusResult<Option<Arc<D>>> {
        let Some(dispatcher) = self.dispatchers.lock().remove(&service.id()) else {
            return Ok(None);
        };
        dispatcher.stop()?;
        debug!(bus = self.name, service = %service.name(), "Dispatcher removed");
        Ok(Some(dispatcher))
    }

    pub(crate) fn len(&self) -> usize {
        self.dispatchers.lock().len()
    }

    pub(crate) fn destroy(&self) -> BusResult<()> {
        let mut binding = self.binding.write();
        let Some(released) = binding.take() else {
            return Err(BusError::NotInitialized(self.name.to_string()));
        };
        let dispatchers: Vec<_> = self.dispatchers.lock().drain().map(|(_, d)| d).collect();
        for dispatcher in &dispatchers {
            if let Err(e) = dispatcher.stop() {
                warn!(bus = self.name, service = %dispatcher.service().name(), error = %e, "Failed to stop dispatcher");
            }
        }
        info!(
            bus = self.name,
            domain = %released.domain,
            dispatchers = dispatchers.len(),
            "Exchange bus destroyed"
        );
        Ok(())
    }
}
