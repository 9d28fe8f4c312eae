//! Scoped property storage.
//!
//! A [`Context`] partitions its properties by [`Scope`]. Each scope has its own
//! name → [`Property`] map, so the same name can hold independent values in
//! different scopes.
//!
//! ```rust,ignore
//! let mut ctx = Context::new();
//! ctx.set_property("trace", json!("abc"), Scope::Message);
//! assert!(ctx.get("trace").is_none()); // EXCHANGE scope is untouched
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The scopes a property can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Lives for the whole exchange.
    Exchange,
    /// Travels with a single message.
    Message,
    /// Attached to the input phase.
    In,
    /// Attached to the output phase.
    Out,
}

impl Scope {
    /// Every scope, in declaration order.
    pub const ALL: [Scope; 4] = [Scope::Exchange, Scope::Message, Scope::In, Scope::Out];

    const fn index(self) -> usize {
        match self {
            Scope::Exchange => 0,
            Scope::Message => 1,
            Scope::In => 2,
            Scope::Out => 3,
        }
    }
}

/// A named, scoped value. A `null` value is still a present property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    name: String,
    scope: Scope,
    value: Value,
}

impl Property {
    /// Creates a property.
    pub fn new(name: impl Into<String>, value: impl Into<Value>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            scope,
            value: value.into(),
        }
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The property value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Exchange- or message-local property store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    scopes: [HashMap<String, Property>; 4],
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, scope: Scope) -> &HashMap<String, Property> {
        &self.scopes[scope.index()]
    }

    fn map_mut(&mut self, scope: Scope) -> &mut HashMap<String, Property> {
        &mut self.scopes[scope.index()]
    }

    /// Sets `name` in `scope`, replacing any previous value there.
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        scope: Scope,
    ) -> &mut Self {
        self.put(Property::new(name, value, scope));
        self
    }

    /// Sets `name` in [`Scope::Exchange`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.set_property(name, value, Scope::Exchange)
    }

    /// Inserts a prebuilt property into its own scope.
    pub fn put(&mut self, property: Property) {
        self.map_mut(property.scope)
            .insert(property.name.clone(), property);
    }

    /// Inserts every property, each into its own scope.
    pub fn set_properties(&mut self, properties: impl IntoIterator<Item = Property>) -> &mut Self {
        for property in properties {
            self.put(property);
        }
        self
    }

    /// Looks up `name` in `scope`.
    pub fn property(&self, name: &str, scope: Scope) -> Option<&Property> {
        self.map(scope).get(name)
    }

    /// Looks up `name` in [`Scope::Exchange`].
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.property(name, Scope::Exchange)
    }

    /// Returns the value of `name` in [`Scope::Exchange`].
    pub fn property_value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(Property::value)
    }

    /// Returns a copy of every property across all scopes.
    pub fn properties(&self) -> Vec<Property> {
        self.scopes
            .iter()
            .flat_map(|map| map.values().cloned())
            .collect()
    }

    /// Returns a copy of the properties in `scope`.
    pub fn properties_in(&self, scope: Scope) -> Vec<Property> {
        self.map(scope).values().cloned().collect()
    }

    /// Removes the property with the same name and scope as `property`.
    pub fn remove_property(&mut self, property: &Property) -> Option<Property> {
        self.map_mut(property.scope).remove(&property.name)
    }

    /// Clears one scope.
    pub fn remove_properties(&mut self, scope: Scope) {
        self.map_mut(scope).clear();
    }

    /// Clears every scope. The context stays usable.
    pub fn clear(&mut self) {
        for map in &mut self.scopes {
            map.clear();
        }
    }

    /// Number of properties across all scopes.
    pub fn len(&self) -> usize {
        self.scopes.iter().map(HashMap::len).sum()
    }

    /// Returns `true` if no scope holds a property.
    pub fn is_empty(&self) -> bool {
        self.scopes.iter().all(HashMap::is_empty)
    }
}
