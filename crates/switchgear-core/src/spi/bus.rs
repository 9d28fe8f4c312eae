//! Exchange bus and dispatcher contracts.
//!
//! A transport plugs into the engine by implementing [`ExchangeBus`], which
//! creates and owns one [`Dispatcher`] per registered service. The exchange
//! only ever calls [`Dispatcher::dispatch`]; everything else is lifecycle.
//!
//! # Channels
//!
//! Every dispatcher has an input channel. Services with at least one
//! request/reply operation also get an output channel for replies and
//! faults. Transports may back both with one object, but deliveries are
//! routed per channel:
//!
//! ```text
//! Exchange(phase IN)  ──dispatch──▶ input channel  ──▶ provider chain
//! Exchange(phase OUT) ──dispatch──▶ output channel ──▶ exchange reply chain
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusResult;
use crate::exchange::Exchange;
use crate::foundation::metadata::{ExchangePhase, ServiceInterface};
use crate::foundation::qname::QName;
use crate::handler::chain::HandlerChain;
use crate::service::Service;

/// Opaque string-keyed bus configuration.
pub type BusConfig = HashMap<String, String>;

/// A type-erased dispatcher.
pub type BoxedDispatcher = Arc<dyn Dispatcher>;

/// A type-erased exchange bus.
pub type BoxedBus = Arc<dyn ExchangeBus>;

/// Logical delivery channel of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchChannel {
    /// Carries IN-phase deliveries to the provider chain.
    Input,
    /// Carries OUT-phase deliveries (replies and faults) to the reply chain.
    Output,
}

impl DispatchChannel {
    /// The channel used for `phase`.
    pub fn for_phase(phase: ExchangePhase) -> Self {
        match phase {
            ExchangePhase::In => Self::Input,
            ExchangePhase::Out => Self::Output,
        }
    }

    /// The phase this channel carries.
    pub fn phase(self) -> ExchangePhase {
        match self {
            Self::Input => ExchangePhase::In,
            Self::Output => ExchangePhase::Out,
        }
    }

    /// Channel name for a service: the service name followed by the phase.
    pub fn channel_name(self, service: &QName) -> String {
        format!("{service}{}", self.phase())
    }

    /// Channels a dispatcher for `interface` has to provision.
    pub fn provision(interface: &ServiceInterface) -> Vec<Self> {
        if interface.has_request_reply() {
            vec![Self::Input, Self::Output]
        } else {
            vec![Self::Input]
        }
    }
}

/// Per-service delivery endpoint.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// The service this dispatcher delivers to.
    fn service(&self) -> &Service;

    /// Provisioned channels.
    fn channels(&self) -> &[DispatchChannel];

    /// Returns `true` if `channel` is provisioned.
    fn has_channel(&self, channel: DispatchChannel) -> bool {
        self.channels().contains(&channel)
    }

    /// Starts accepting deliveries. Fails if already started.
    fn start(&self) -> BusResult<()>;

    /// Stops accepting deliveries.
    fn stop(&self) -> BusResult<()>;

    /// Returns `true` between `start` and `stop`.
    fn is_running(&self) -> bool;

    /// Delivers the exchange's current message on the channel for its phase.
    async fn dispatch(&self, exchange: Exchange) -> BusResult<()>;
}

/// Transport provider owning a set of dispatchers.
pub trait ExchangeBus: Send + Sync {
    /// Provider name, as used in configuration.
    fn name(&self) -> &str;

    /// Initializes the bus for a domain. Fails if already initialized.
    fn init(&self, domain: &QName, config: &BusConfig) -> BusResult<()>;

    /// Returns `true` after `init` and before `destroy`.
    fn is_initialized(&self) -> bool;

    /// Creates and starts a dispatcher bound to `service` and `chain`.
    fn create_dispatcher(&self, service: &Service, chain: HandlerChain) -> BusResult<BoxedDispatcher>;

    /// Returns the dispatcher bound to `service`.
    fn get_dispatcher(&self, service: &Service) -> Option<BoxedDispatcher>;

    /// Stops and forgets the dispatcher bound to `service`.
    fn remove_dispatcher(&self, service: &Service) -> BusResult<Option<BoxedDispatcher>>;

    /// Stops every dispatcher and releases the bus.
    fn destroy(&self) -> BusResult<()>;
}
