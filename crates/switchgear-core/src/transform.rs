//! Message transformation.
//!
//! When an exchange is sent, it records a [`TransformSequence`] in the
//! message context: the type the sender produced and the type the receiver
//! expects. The transformation handler of the default chain reads that
//! sequence back and asks the domain's [`TransformerRegistry`] for a
//! [`Transformer`] between the two types.
//!
//! ```rust,ignore
//! let registry = TransformerRegistry::new();
//! registry.add(transformer_fn(from, to, |body| {
//!     Ok(json!({ "wrapped": body }))
//! }));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::foundation::context::{Context, Scope};
use crate::foundation::qname::QName;

/// Message-scope property holding the active sequence.
pub const TRANSFORM_SEQUENCE_PROPERTY: &str = "switchgear.transform.sequence";

// =============================================================================
// TransformSequence
// =============================================================================

/// A `from → to` type conversion attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSequence {
    from: QName,
    to: QName,
}

/// Half-built sequence returned by [`TransformSequence::from`].
#[derive(Debug, Clone)]
pub struct TransformSequenceBuilder {
    from: QName,
}

impl TransformSequenceBuilder {
    /// Completes the sequence.
    pub fn to(self, to: QName) -> TransformSequence {
        TransformSequence {
            from: self.from,
            to,
        }
    }
}

impl TransformSequence {
    /// Starts a sequence from `from`.
    #[allow(clippy::should_implement_trait)]
    pub fn from(from: QName) -> TransformSequenceBuilder {
        TransformSequenceBuilder { from }
    }

    /// Source type.
    pub fn from_type(&self) -> &QName {
        &self.from
    }

    /// Target type.
    pub fn to_type(&self) -> &QName {
        &self.to
    }

    /// Returns `true` when source and target are the same type.
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Stores the sequence in `context` under [`Scope::Message`].
    pub fn associate_with(self, context: &mut Context) {
        match serde_json::to_value(&self) {
            Ok(value) => {
                context.set_property(TRANSFORM_SEQUENCE_PROPERTY, value, Scope::Message);
            }
            Err(e) => warn!(error = %e, "Failed to encode transform sequence"),
        }
    }

    /// Reads the sequence associated with `context`, if any.
    pub fn of(context: &Context) -> Option<Self> {
        let prop = context.property(TRANSFORM_SEQUENCE_PROPERTY, Scope::Message)?;
        Self::deserialize(prop.value()).ok()
    }
}

// =============================================================================
// Transformer
// =============================================================================

/// Converts a message body from one type to another.
pub trait Transformer: Send + Sync {
    /// Source type.
    fn from(&self) -> &QName;

    /// Target type.
    fn to(&self) -> &QName;

    /// Performs the conversion.
    fn transform(&self, body: Value) -> Result<Value, TransformError>;
}

/// Type-erased transformer.
pub type BoxedTransformer = Arc<dyn Transformer>;

struct FnTransformer<F> {
    from: QName,
    to: QName,
    f: F,
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(Value) -> Result<Value, TransformError> + Send + Sync,
{
    fn from(&self) -> &QName {
        &self.from
    }

    fn to(&self) -> &QName {
        &self.to
    }

    fn transform(&self, body: Value) -> Result<Value, TransformError> {
        (self.f)(body)
    }
}

/// Wraps a closure as a [`Transformer`].
pub fn transformer_fn<F>(from: QName, to: QName, f: F) -> BoxedTransformer
where
    F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
{
    Arc::new(FnTransformer { from, to, f })
}

// =============================================================================
// TransformerRegistry
// =============================================================================

/// Domain-wide lookup of transformers by `(from, to)` pair.
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: RwLock<HashMap<(QName, QName), BoxedTransformer>>,
}

impl TransformerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transformer, replacing any previous one for the same pair.
    pub fn add(&self, transformer: BoxedTransformer) {
        let key = (transformer.from().clone(), transformer.to().clone());
        debug!(from = %key.0, to = %key.1, "Registered transformer");
        self.transformers.write().insert(key, transformer);
    }

    /// Finds the transformer for `from → to`.
    pub fn find(&self, from: &QName, to: &QName) -> Option<BoxedTransformer> {
        self.transformers
            .read()
            .get(&(from.clone(), to.clone()))
            .cloned()
    }

    /// Returns `true` if a transformer for `from → to` exists.
    pub fn has(&self, from: &QName, to: &QName) -> bool {
        self.transformers
            .read()
            .contains_key(&(from.clone(), to.clone()))
    }

    /// Removes the transformer for `from → to`.
    pub fn remove(&self, from: &QName, to: &QName) -> Option<BoxedTransformer> {
        self.transformers.write().remove(&(from.clone(), to.clone()))
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.transformers.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.transformers.read().is_empty()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("count", &self.len())
            .finish()
    }
}
