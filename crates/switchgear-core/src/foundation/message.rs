//! Message envelope.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::foundation::context::{Context, Scope};

/// A payload plus its own [`Context`].
///
/// Message-scoped properties travel with the message across a send; the
/// exchange keeps its own context for properties that live for the whole
/// interaction. Once handed to [`Exchange::send`](crate::exchange::Exchange::send)
/// the exchange owns the message and handlers only see copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    body: Value,
    context: Context,
}

impl Message {
    /// Creates a message with the given body.
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            context: Context::new(),
        }
    }

    /// Creates a message by serializing `body`.
    pub fn from_serialize<T: Serialize>(body: &T) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::to_value(body)?))
    }

    /// Adds a property to the message context (builder style).
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        scope: Scope,
    ) -> Self {
        self.context.set_property(name, value, scope);
        self
    }

    /// Returns the body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Deserializes the body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.body)
    }

    /// Replaces the body, keeping the context.
    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = body.into();
    }

    /// Consumes the message, returning the body.
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Returns the message context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the message context mutably.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Order {
        id: u32,
    }

    #[test]
    fn test_typed_body() {
        let msg = Message::from_serialize(&Order { id: 7 }).unwrap();
        assert_eq!(msg.body(), &json!({ "id": 7 }));
        assert_eq!(msg.body_as::<Order>().unwrap(), Order { id: 7 });
    }

    #[test]
    fn test_message_context_is_independent() {
        let msg = Message::new("ping").with_property("k", "v", Scope::Message);
        let copy = msg.clone().with_property("k", "other", Scope::Message);
        assert_eq!(
            msg.context().property("k", Scope::Message).unwrap().value(),
            &json!("v")
        );
        assert_eq!(
            copy.context().property("k", Scope::Message).unwrap().value(),
            &json!("other")
        );
    }
}
