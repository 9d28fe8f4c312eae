//! Inline exchange bus.
//!
//! [`LocalExchangeBus`] delivers on the calling task: `dispatch` returns once
//! the chain for the delivery has run. Nested sends made by handlers (a
//! provider replying, a fault raised from the chain) are delivered the same
//! way before the outer `dispatch` returns.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;

use switchgear_core::{
    BoxedDispatcher, BusConfig, BusError, BusResult, DispatchChannel, Dispatcher, Exchange,
    ExchangeBus, ExchangePhase, ExchangeState, HandlerChain, QName, Service, deliver_input,
    deliver_output,
};

use crate::common::BusState;

// ─── Dispatcher ───────────────────────────────────────────────────────────────

/// Dispatcher running chains inline.
pub struct LocalDispatcher {
    service: Service,
    chain: HandlerChain,
    channels: Vec<DispatchChannel>,
    running: AtomicBool,
}

impl LocalDispatcher {
    /// Creates a stopped dispatcher for `service`.
    pub fn new(service: Service, chain: HandlerChain) -> Self {
        let channels = DispatchChannel::provision(service.interface());
        Self {
            service,
            chain,
            channels,
            running: AtomicBool::new(false),
        }
    }

    /// The provider chain.
    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    fn service(&self) -> &Service {
        &self.service
    }

    fn channels(&self) -> &[DispatchChannel] {
        &self.channels
    }

    fn start(&self) -> BusResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(BusError::AlreadyStarted(self.service.name().to_string()));
        }
        Ok(())
    }

    fn stop(&self) -> BusResult<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn dispatch(&self, exchange: Exchange) -> BusResult<()> {
        if !self.is_running() {
            return Err(BusError::NotRunning(self.service.name().to_string()));
        }
        let phase = exchange.phase().unwrap_or(ExchangePhase::In);
        let channel = DispatchChannel::for_phase(phase);
        debug!(
            exchange_id = %exchange.id(),
            channel = %channel.channel_name(self.service.name()),
            "Dispatching exchange"
        );

        match channel {
            DispatchChannel::Input => deliver_input(&self.chain, &exchange).await,
            DispatchChannel::Output
                if self.has_channel(channel) || exchange.state() == ExchangeState::Fault =>
            {
                deliver_output(&exchange).await
            }
            DispatchChannel::Output => {
                return Err(BusError::NoChannel {
                    service: self.service.name().to_string(),
                    phase,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDispatcher")
            .field("service", self.service.name())
            .field("channels", &self.channels)
            .field("running", &self.is_running())
            .finish()
    }
}

// ─── Bus ──────────────────────────────────────────────────────────────────────

/// The default, inline exchange bus.
pub struct LocalExchangeBus {
    state: BusState<LocalDispatcher>,
}

impl LocalExchangeBus {
    /// Provider name of this bus.
    pub const NAME: &'static str = "local";

    /// Creates an uninitialized bus.
    pub fn new() -> Self {
        Self {
            state: BusState::new(Self::NAME),
        }
    }
}

impl Default for LocalExchangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeBus for LocalExchangeBus {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&self, domain: &QName, config: &BusConfig) -> BusResult<()> {
        self.state.init(domain, config)
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    fn create_dispatcher(&self, service: &Service, chain: HandlerChain) -> BusResult<BoxedDispatcher> {
        let dispatcher = Arc::new(LocalDispatcher::new(service.clone(), chain));
        let dispatcher: BoxedDispatcher = self.state.attach(service, dispatcher)?;
        Ok(dispatcher)
    }

    fn get_dispatcher(&self, service: &Service) -> Option<BoxedDispatcher> {
        self.state.get(service).map(|d| d as BoxedDispatcher)
    }

    fn remove_dispatcher(&self, service: &Service) -> BusResult<Option<BoxedDispatcher>> {
        Ok(self.state.remove(service)?.map(|d| d as BoxedDispatcher))
    }

    fn destroy(&self) -> BusResult<()> {
        self.state.destroy()
    }
}

impl fmt::Debug for LocalExchangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalExchangeBus")
            .field("domain", &self.state.domain())
            .field("dispatchers", &self.state.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use switchgear_core::{
        ExchangeContract, HandlerError, Message, ServiceInterface, ServiceOperation,
        ServiceReference, handler_fn, handler_fn_with_fault,
    };

    fn qn(s: &str) -> QName {
        QName::parse(s).unwrap()
    }

    fn initialized_bus() -> LocalExchangeBus {
        let bus = LocalExchangeBus::new();
        bus.init(&qn("domain"), &BusConfig::new()).unwrap();
        bus
    }

    fn service(interface: ServiceInterface) -> Service {
        Service::new(qn("S"), interface, vec![], qn("domain"))
    }

    fn counting_chain(counter: &Arc<AtomicUsize>) -> HandlerChain {
        let counter = counter.clone();
        let mut chain = HandlerChain::new();
        chain
            .add_last(
                "count",
                handler_fn(move |_exchange: Exchange| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        chain
    }

    #[test]
    fn test_lifecycle_guards() {
        let bus = LocalExchangeBus::new();
        let s = service(ServiceInterface::default_in_only());
        assert_eq!(
            bus.create_dispatcher(&s, HandlerChain::new()).err(),
            Some(BusError::NotInitialized("local".into()))
        );
        assert_eq!(bus.destroy().unwrap_err(), BusError::NotInitialized("local".into()));

        bus.init(&qn("domain"), &BusConfig::new()).unwrap();
        assert_eq!(
            bus.init(&qn("domain"), &BusConfig::new()).unwrap_err(),
            BusError::AlreadyInitialized("local".into())
        );

        let dispatcher = bus.create_dispatcher(&s, HandlerChain::new()).unwrap();
        assert!(dispatcher.is_running());
        assert_eq!(dispatcher.start().unwrap_err(), BusError::AlreadyStarted("S".into()));

        bus.destroy().unwrap();
        assert!(!dispatcher.is_running());
        assert!(!bus.is_initialized());
        assert!(bus.get_dispatcher(&s).is_none());
    }

    #[test]
    fn test_dispatchers_keyed_by_service() {
        let bus = initialized_bus();
        let a = service(ServiceInterface::default_in_only());
        let b = service(ServiceInterface::default_in_out());
        bus.create_dispatcher(&a, HandlerChain::new()).unwrap();
        bus.create_dispatcher(&b, HandlerChain::new()).unwrap();

        let da = bus.get_dispatcher(&a).unwrap();
        let db = bus.get_dispatcher(&b).unwrap();
        assert_eq!(da.channels(), &[DispatchChannel::Input]);
        assert_eq!(db.channels(), &[DispatchChannel::Input, DispatchChannel::Output]);

        let removed = bus.remove_dispatcher(&a).unwrap().unwrap();
        assert!(!removed.is_running());
        assert!(bus.get_dispatcher(&a).is_none());
        assert!(bus.remove_dispatcher(&a).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_runs_chain_inline() {
        let bus = initialized_bus();
        let counter = Arc::new(AtomicUsize::new(0));
        let op = ServiceOperation::generic_in_only("process");
        let s = service(ServiceInterface::new([op.clone()]).unwrap());
        let dispatcher = bus.create_dispatcher(&s, counting_chain(&counter)).unwrap();

        let exchange = Exchange::new(
            s.as_reference(),
            ExchangeContract::between(&op, &op),
            dispatcher.clone(),
            None,
        )
        .unwrap();
        exchange.send(Message::new("ping")).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        dispatcher.stop().unwrap();
        let late = Exchange::new(
            ServiceReference::new(qn("S"), s.interface().clone()),
            ExchangeContract::between(&op, &op),
            dispatcher,
            None,
        )
        .unwrap();
        let err = late.send(Message::new("ping")).await.unwrap_err();
        assert_eq!(err.to_string(), "dispatcher for 'S' is not running");
    }

    #[tokio::test]
    async fn test_one_way_fault_reaches_reply_chain() {
        let bus = initialized_bus();
        let op = ServiceOperation::generic_in_only("process");
        let s = service(ServiceInterface::new([op.clone()]).unwrap());
        let failing = handler_fn(|_exchange: Exchange| async move { Err(HandlerError::fault("boom")) });
        let mut chain = HandlerChain::new();
        chain.add_last("provider", failing).unwrap();
        let dispatcher = bus.create_dispatcher(&s, chain).unwrap();

        let faults = Arc::new(AtomicUsize::new(0));
        let seen = faults.clone();
        let mut reply_chain = HandlerChain::new();
        reply_chain
            .add_last(
                "reply",
                handler_fn_with_fault(
                    |_exchange: Exchange| async move { Ok(()) },
                    move |_exchange: Exchange| {
                        let seen = seen.clone();
                        async move {
                            seen.fetch_add(1, Ordering::SeqCst);
                        }
                    },
                ),
            )
            .unwrap();

        let exchange = Exchange::new(
            s.as_reference(),
            ExchangeContract::between(&op, &op),
            dispatcher,
            Some(reply_chain),
        )
        .unwrap();
        exchange.send(Message::new(json!({ "n": 1 }))).await.unwrap();
        assert_eq!(exchange.state(), ExchangeState::Fault);
        assert_eq!(exchange.phase(), Some(ExchangePhase::Out));
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }
}
