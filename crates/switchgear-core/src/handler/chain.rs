//! Ordered, named handler chains.
//!
//! A [`HandlerChain`] is an indexed list of named slots plus a name → index
//! map. A slot either holds a handler or is a [`Slot::Placeholder`] that only
//! reserves a position. The domain's template chain reserves the
//! [`PROVIDER_HANDLER`] position that way, and every registration copies the
//! template and [`replace`](HandlerChain::replace)s the placeholder with the
//! service provider.
//!
//! # Execution
//!
//! [`handle`](HandlerChain::handle) runs each handler's message entry point in
//! chain order. When one returns an error, every handler in the chain (first
//! to last, the failing one included) gets its fault entry point invoked and
//! the error is returned; no further message entry points run.
//!
//! ```text
//! transaction-pre-invoke → generic-policy → validation-before-transform
//!   → transformation → validation-after-transform → provider
//!   → transaction-post-invoke
//! ```

use std::collections::HashMap;

use tracing::{Instrument, debug, debug_span, warn};

use crate::error::{ChainError, HandlerResult};
use crate::exchange::Exchange;
use crate::handler::traits::BoxedHandler;

/// Reserved name of the provider slot.
pub const PROVIDER_HANDLER: &str = "provider";

/// Name under which a reply handler is appended to a reply chain.
pub const REPLY_HANDLER: &str = "replyHandler";

/// Content of one chain position.
#[derive(Clone)]
pub enum Slot {
    /// A live handler.
    Handler(BoxedHandler),
    /// A reserved position skipped during execution.
    Placeholder,
}

impl Slot {
    /// Returns the handler, if this slot holds one.
    pub fn handler(&self) -> Option<&BoxedHandler> {
        match self {
            Slot::Handler(h) => Some(h),
            Slot::Placeholder => None,
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Handler(_) => f.write_str("Handler"),
            Slot::Placeholder => f.write_str("Placeholder"),
        }
    }
}

/// An ordered sequence of uniquely named slots.
///
/// Cloning (or [`copy`](Self::copy)) yields an independent ordering that
/// shares the same handler instances.
#[derive(Clone, Default)]
pub struct HandlerChain {
    entries: Vec<(String, Slot)>,
    index: HashMap<String, usize>,
}

impl HandlerChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a structural copy sharing handler instances.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
    }

    fn position(&self, name: &str) -> Result<usize, ChainError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| ChainError::NotFound(name.to_string()))
    }

    fn insert_at(&mut self, at: usize, name: String, slot: Slot) -> Result<(), ChainError> {
        if self.index.contains_key(&name) {
            return Err(ChainError::DuplicateName(name));
        }
        self.entries.insert(at, (name, slot));
        self.reindex();
        Ok(())
    }

    /// Appends a handler.
    pub fn add_last(&mut self, name: impl Into<String>, handler: BoxedHandler) -> Result<(), ChainError> {
        self.insert_at(self.entries.len(), name.into(), Slot::Handler(handler))
    }

    /// Prepends a handler.
    pub fn add_first(&mut self, name: impl Into<String>, handler: BoxedHandler) -> Result<(), ChainError> {
        self.insert_at(0, name.into(), Slot::Handler(handler))
    }

    /// Appends a placeholder slot.
    pub fn add_placeholder(&mut self, name: impl Into<String>) -> Result<(), ChainError> {
        self.insert_at(self.entries.len(), name.into(), Slot::Placeholder)
    }

    /// Inserts a handler directly before `anchor`.
    pub fn insert_before(
        &mut self,
        anchor: &str,
        name: impl Into<String>,
        handler: BoxedHandler,
    ) -> Result<(), ChainError> {
        let at = self.position(anchor)?;
        self.insert_at(at, name.into(), Slot::Handler(handler))
    }

    /// Inserts a handler directly after `anchor`.
    pub fn insert_after(
        &mut self,
        anchor: &str,
        name: impl Into<String>,
        handler: BoxedHandler,
    ) -> Result<(), ChainError> {
        let at = self.position(anchor)?;
        self.insert_at(at + 1, name.into(), Slot::Handler(handler))
    }

    /// Replaces the slot named `name`, returning the previous handler if any.
    pub fn replace(&mut self, name: &str, handler: BoxedHandler) -> Result<Option<BoxedHandler>, ChainError> {
        let at = self.position(name)?;
        let previous = std::mem::replace(&mut self.entries[at].1, Slot::Handler(handler));
        Ok(match previous {
            Slot::Handler(h) => Some(h),
            Slot::Placeholder => None,
        })
    }

    /// Removes the slot named `name`.
    pub fn remove(&mut self, name: &str) -> Result<Slot, ChainError> {
        let at = self.position(name)?;
        let (_, slot) = self.entries.remove(at);
        self.reindex();
        Ok(slot)
    }

    /// Returns the slot named `name`.
    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Returns `true` if a slot named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Slot names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the chain has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn handlers(&self) -> impl Iterator<Item = (&str, &BoxedHandler)> {
        self.entries
            .iter()
            .filter_map(|(name, slot)| slot.handler().map(|h| (name.as_str(), h)))
    }

    /// Runs every handler's message entry point in order.
    pub async fn handle(&self, exchange: &Exchange) -> HandlerResult {
        let span = debug_span!("handle", exchange_id = %exchange.id());
        self.run(exchange).instrument(span).await
    }

    async fn run(&self, exchange: &Exchange) -> HandlerResult {
        for (name, handler) in self.handlers() {
            debug!(handler = name, "Invoking handler");
            if let Err(err) = handler.handle_message(exchange).await {
                warn!(
                    handler = name,
                    exchange_id = %exchange.id(),
                    error = %err,
                    "Handler raised a fault, notifying chain"
                );
                self.handle_fault(exchange).await;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Runs every handler's fault entry point in order.
    pub async fn handle_fault(&self, exchange: &Exchange) {
        for (name, handler) in self.handlers() {
            debug!(handler = name, "Invoking fault handler");
            handler.handle_fault(exchange).await;
        }
    }
}

/// Builds a chain from named slots in order.
///
/// A repeated name overwrites the earlier slot in place.
impl<N: Into<String>> FromIterator<(N, Slot)> for HandlerChain {
    fn from_iter<I: IntoIterator<Item = (N, Slot)>>(iter: I) -> Self {
        let mut chain = Self::new();
        for (name, slot) in iter {
            let name = name.into();
            match chain.index.get(&name) {
                Some(&at) => chain.entries[at].1 = slot,
                None => {
                    chain.index.insert(name.clone(), chain.entries.len());
                    chain.entries.push((name, slot));
                }
            }
        }
        chain
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain")
            .field("names", &self.names())
            .finish()
    }
}
