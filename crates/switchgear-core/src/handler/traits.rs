//! The exchange handler trait.
//!
//! Every unit of behavior in a [`HandlerChain`](super::chain::HandlerChain)
//! implements [`ExchangeHandler`]. Handlers are shared (`Arc`) between the
//! domain's template chain and every copy taken from it, so they must not keep
//! per-exchange state in `self`; per-exchange data belongs in the exchange
//! context.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchgear_core::{handler_fn, Exchange, Message};
//!
//! let echo = handler_fn(|exchange: Exchange| async move {
//!     let body = exchange.message().map(|m| m.body().clone()).unwrap_or_default();
//!     exchange.send(Message::new(body)).await?;
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{Ready, ready};

use crate::error::HandlerResult;
use crate::exchange::Exchange;

/// A unit of logic invoked by a handler chain.
#[async_trait]
pub trait ExchangeHandler: Send + Sync {
    /// Processes the exchange's current message.
    ///
    /// Returning an error stops the chain and triggers fault notification.
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult;

    /// Reacts to a fault on the exchange. The default does nothing.
    async fn handle_fault(&self, _exchange: &Exchange) {}
}

/// A type-erased, shareable handler.
pub type BoxedHandler = Arc<dyn ExchangeHandler>;

// ============================================================================
// Closure handlers
// ============================================================================

type NoFault = fn(Exchange) -> Ready<()>;

fn no_fault(_exchange: Exchange) -> Ready<()> {
    ready(())
}

/// Handler backed by async closures.
///
/// Closures receive an owned [`Exchange`] handle so their futures can be
/// `'static`.
pub struct FnHandler<M, F> {
    on_message: M,
    on_fault: F,
}

#[async_trait]
impl<M, MFut, F, FFut> ExchangeHandler for FnHandler<M, F>
where
    M: Fn(Exchange) -> MFut + Send + Sync + 'static,
    MFut: Future<Output = HandlerResult> + Send + 'static,
    F: Fn(Exchange) -> FFut + Send + Sync + 'static,
    FFut: Future<Output = ()> + Send + 'static,
{
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult {
        (self.on_message)(exchange.clone()).await
    }

    async fn handle_fault(&self, exchange: &Exchange) {
        (self.on_fault)(exchange.clone()).await;
    }
}

/// Wraps an async closure as a handler with no fault behavior.
pub fn handler_fn<M, MFut>(on_message: M) -> BoxedHandler
where
    M: Fn(Exchange) -> MFut + Send + Sync + 'static,
    MFut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        on_message,
        on_fault: no_fault as NoFault,
    })
}

/// Wraps a pair of async closures for the message and fault entry points.
pub fn handler_fn_with_fault<M, MFut, F, FFut>(on_message: M, on_fault: F) -> BoxedHandler
where
    M: Fn(Exchange) -> MFut + Send + Sync + 'static,
    MFut: Future<Output = HandlerResult> + Send + 'static,
    F: Fn(Exchange) -> FFut + Send + Sync + 'static,
    FFut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler {
        on_message,
        on_fault,
    })
}

/// A handler that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl ExchangeHandler for NoopHandler {
    async fn handle_message(&self, _exchange: &Exchange) -> HandlerResult {
        Ok(())
    }
}
