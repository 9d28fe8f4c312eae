//! Target addressing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::exchange::Exchange;
use crate::foundation::context::Scope;
use crate::handler::traits::ExchangeHandler;
use crate::spi::registry::ServiceRegistry;

/// Slot name under which the addressing handler is usually spliced in.
pub const ADDRESSING: &str = "addressing";

/// Exchange property naming the resolved target service.
pub const TARGET_PROPERTY: &str = "switchgear.exchange.target";

/// Records the delivering dispatcher's service as the exchange target.
///
/// Not part of the default chain; splice it in with
/// [`HandlerChain::insert_before`](crate::handler::chain::HandlerChain::insert_before).
/// Faults when the target has been unregistered in the meantime.
pub struct AddressingHandler {
    registry: Arc<dyn ServiceRegistry>,
}

impl AddressingHandler {
    /// Creates a handler checking targets against `registry`.
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ExchangeHandler for AddressingHandler {
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult {
        let target = match exchange.target() {
            Some(target) => target,
            None => {
                let service = exchange.dispatcher().service().clone();
                debug!(
                    exchange_id = %exchange.id(),
                    target = %service.name(),
                    service_id = %service.id(),
                    "Addressed exchange"
                );
                exchange.set_property(TARGET_PROPERTY, service.name().to_string(), Scope::Exchange);
                exchange.set_target(service.clone());
                service
            }
        };

        if !self.registry.contains(&target) {
            return Err(HandlerError::fault(format!(
                "target service '{}' is no longer registered",
                target.name()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AddressingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressingHandler")
            .field("registry", &self.registry.name())
            .finish()
    }
}
