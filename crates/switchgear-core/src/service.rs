//! Services, service references and policy tokens.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::foundation::metadata::ServiceInterface;
use crate::foundation::qname::QName;
use crate::handler::traits::BoxedHandler;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u64);

impl ServiceId {
    fn next() -> Self {
        Self(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc-{}", self.0)
    }
}

/// An opaque policy requirement token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy(String);

impl Policy {
    /// Creates a policy token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Service
// =============================================================================

struct ServiceInner {
    id: ServiceId,
    name: QName,
    interface: ServiceInterface,
    policies: Vec<Policy>,
    domain: QName,
}

/// A registered service implementation.
///
/// Cheap to clone. Two handles are equal when they refer to the same
/// registration, even if another service shares the name.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    /// Creates a service with a fresh identity.
    pub fn new(name: QName, interface: ServiceInterface, policies: Vec<Policy>, domain: QName) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                id: ServiceId::next(),
                name,
                interface,
                policies,
                domain,
            }),
        }
    }

    /// Registration identity.
    pub fn id(&self) -> ServiceId {
        self.inner.id
    }

    /// Logical service name.
    pub fn name(&self) -> &QName {
        &self.inner.name
    }

    /// Operation catalog.
    pub fn interface(&self) -> &ServiceInterface {
        &self.inner.interface
    }

    /// Policy requirements, in declaration order.
    pub fn policies(&self) -> &[Policy] {
        &self.inner.policies
    }

    /// Name of the owning domain.
    pub fn domain(&self) -> &QName {
        &self.inner.domain
    }

    /// A reference to this service's name and catalog.
    pub fn as_reference(&self) -> ServiceReference {
        ServiceReference::new(self.name().clone(), self.interface().clone())
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Service {}

impl Hash for Service {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("operations", &self.inner.interface.len())
            .field("policies", &self.inner.policies)
            .field("domain", &self.inner.domain)
            .finish()
    }
}

// =============================================================================
// ServiceReference
// =============================================================================

/// Caller-side handle to a logical service name.
///
/// The referenced name does not have to be registered yet; it is resolved
/// each time an exchange is created.
#[derive(Clone)]
pub struct ServiceReference {
    name: QName,
    interface: ServiceInterface,
    reply_handler: Option<BoxedHandler>,
}

impl ServiceReference {
    /// Creates a reference.
    pub fn new(name: QName, interface: ServiceInterface) -> Self {
        Self {
            name,
            interface,
            reply_handler: None,
        }
    }

    /// Attaches a default reply handler.
    pub fn with_reply_handler(mut self, handler: BoxedHandler) -> Self {
        self.reply_handler = Some(handler);
        self
    }

    /// Referenced name.
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Operation catalog the caller expects.
    pub fn interface(&self) -> &ServiceInterface {
        &self.interface
    }

    /// Default reply handler, if any.
    pub fn reply_handler(&self) -> Option<&BoxedHandler> {
        self.reply_handler.as_ref()
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("name", &self.name)
            .field("operations", &self.interface.len())
            .field("has_reply_handler", &self.reply_handler.is_some())
            .finish()
    }
}
