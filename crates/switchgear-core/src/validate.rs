//! Message validation.
//!
//! Validators check a message body of one type. The default chain validates
//! the sequence's source type before transformation and its target type
//! after it, so a pair `(from, to)` is covered by two single-type lookups.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::TransformError;
use crate::foundation::qname::QName;

/// Checks a message body of a given type.
pub trait Validator: Send + Sync {
    /// The validated type.
    fn type_name(&self) -> &QName;

    /// Validates `body`.
    fn validate(&self, body: &Value) -> Result<(), TransformError>;
}

/// Type-erased validator.
pub type BoxedValidator = Arc<dyn Validator>;

struct FnValidator<F> {
    type_name: QName,
    f: F,
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value) -> Result<(), TransformError> + Send + Sync,
{
    fn type_name(&self) -> &QName {
        &self.type_name
    }

    fn validate(&self, body: &Value) -> Result<(), TransformError> {
        (self.f)(body)
    }
}

/// Wraps a closure as a [`Validator`].
pub fn validator_fn<F>(type_name: QName, f: F) -> BoxedValidator
where
    F: Fn(&Value) -> Result<(), TransformError> + Send + Sync + 'static,
{
    Arc::new(FnValidator { type_name, f })
}

/// Domain-wide lookup of validators by type.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: RwLock<HashMap<QName, BoxedValidator>>,
}

impl ValidatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a validator, replacing any previous one for the same type.
    pub fn add(&self, validator: BoxedValidator) {
        let name = validator.type_name().clone();
        debug!(type_name = %name, "Registered validator");
        self.validators.write().insert(name, validator);
    }

    /// Finds the validator for `type_name`.
    pub fn find(&self, type_name: &QName) -> Option<BoxedValidator> {
        self.validators.read().get(type_name).cloned()
    }

    /// Removes the validator for `type_name`.
    pub fn remove(&self, type_name: &QName) -> Option<BoxedValidator> {
        self.validators.write().remove(type_name)
    }

    /// Number of registered validators.
    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("count", &self.len())
            .finish()
    }
}
