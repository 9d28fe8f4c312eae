//! Delivery helpers shared by every transport.
//!
//! A dispatcher only decides *where* and *when* an exchange is delivered.
//! What a delivery does is the same for every transport: an IN delivery runs
//! the provider chain, an OUT delivery runs the exchange's reply chain.

use serde_json::json;
use tracing::{debug, error, warn};

use crate::exchange::Exchange;
use crate::foundation::message::Message;
use crate::foundation::metadata::{ExchangePhase, ExchangeState};
use crate::handler::chain::HandlerChain;

/// Runs the provider chain for an IN delivery.
///
/// A handler error on an exchange that is still IN and OK becomes a fault
/// message (`{"error": "..."}`) sent back through the exchange. Handler
/// errors never reach the dispatch caller.
pub async fn deliver_input(chain: &HandlerChain, exchange: &Exchange) {
    debug!(exchange_id = %exchange.id(), "Delivering IN");
    let Err(err) = chain.handle(exchange).await else {
        return;
    };

    if exchange.phase() != Some(ExchangePhase::In) || exchange.state() != ExchangeState::Ok {
        warn!(
            exchange_id = %exchange.id(),
            phase = ?exchange.phase(),
            state = %exchange.state(),
            error = %err,
            "Handler failed after the exchange left the IN phase"
        );
        return;
    }

    let fault = Message::new(json!({ "error": err.to_string() }));
    if let Err(e) = exchange.send_fault(fault).await {
        error!(exchange_id = %exchange.id(), error = %e, "Failed to send fault");
    }
}

/// Runs the exchange's reply chain for an OUT delivery.
pub async fn deliver_output(exchange: &Exchange) {
    let Some(reply_chain) = exchange.reply_chain() else {
        warn!(exchange_id = %exchange.id(), "OUT delivery without a reply chain, dropping");
        return;
    };

    match exchange.state() {
        ExchangeState::Ok => {
            debug!(exchange_id = %exchange.id(), "Delivering OUT");
            if let Err(err) = reply_chain.handle(exchange).await {
                error!(exchange_id = %exchange.id(), error = %err, "Reply chain failed");
            }
        }
        ExchangeState::Fault => {
            debug!(exchange_id = %exchange.id(), "Delivering fault");
            reply_chain.handle_fault(exchange).await;
        }
    }
}
