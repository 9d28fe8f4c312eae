//! The exchange state machine.
//!
//! An [`Exchange`] carries one interaction between a caller and a service.
//! It moves through `phase ∈ {unset, IN, OUT}` and `state ∈ {OK, FAULT}`:
//!
//! ```text
//!            send               send (REQUEST_REPLY)
//!   unset ─────────▶ IN ──────────────────────────────▶ OUT / OK
//!                     │
//!                     └──────── send_fault ───────────▶ OUT / FAULT
//! ```
//!
//! Phases never regress and `FAULT` is absorbing. Every successful transition
//! hands the exchange to its bound [`Dispatcher`](crate::spi::bus::Dispatcher), except a fault with no
//! reply chain, which is logged and dropped.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ExchangeError, ExchangeResult};
use crate::foundation::context::{Context, Property, Scope};
use crate::foundation::message::Message;
use crate::foundation::metadata::{
    ExchangeContract, ExchangePattern, ExchangePhase, ExchangeState, InvocationMetadata,
    ServiceOperation,
};
use crate::handler::chain::HandlerChain;
use crate::service::{Service, ServiceReference};
use crate::spi::bus::BoxedDispatcher;
use crate::transform::TransformSequence;

#[derive(Debug, Default)]
struct Status {
    phase: Option<ExchangePhase>,
    state: ExchangeState,
    message: Option<Message>,
}

struct ExchangeInner {
    id: String,
    reference: ServiceReference,
    contract: ExchangeContract,
    invoker: InvocationMetadata,
    operation: ServiceOperation,
    dispatcher: BoxedDispatcher,
    reply_chain: Option<HandlerChain>,
    status: Mutex<Status>,
    context: Mutex<Context>,
    target: Mutex<Option<Service>>,
}

/// One in-flight interaction between a caller and a service.
///
/// Cloning yields another handle to the same exchange.
#[derive(Clone)]
pub struct Exchange {
    inner: Arc<ExchangeInner>,
}

impl Exchange {
    /// Builds an exchange bound to `dispatcher`.
    ///
    /// Fails if the contract lacks either side, or if the operation is
    /// request/reply and no reply chain is given.
    pub fn new(
        reference: ServiceReference,
        contract: ExchangeContract,
        dispatcher: BoxedDispatcher,
        reply_chain: Option<HandlerChain>,
    ) -> ExchangeResult<Self> {
        let invoker = contract
            .invoker_metadata()
            .cloned()
            .ok_or(ExchangeError::MissingInvokerMetadata)?;
        let operation = contract
            .service_operation()
            .cloned()
            .ok_or_else(|| ExchangeError::MissingOperation(contract.operation_name().to_string()))?;
        if operation.pattern() == ExchangePattern::RequestReply && reply_chain.is_none() {
            return Err(ExchangeError::MissingReplyChain(operation.name().to_string()));
        }

        let exchange = Self {
            inner: Arc::new(ExchangeInner {
                id: Uuid::new_v4().to_string(),
                reference,
                contract,
                invoker,
                operation,
                dispatcher,
                reply_chain,
                status: Mutex::new(Status::default()),
                context: Mutex::new(Context::new()),
                target: Mutex::new(None),
            }),
        };
        debug!(
            exchange_id = %exchange.id(),
            service = %exchange.service().name(),
            operation = exchange.inner.operation.name(),
            pattern = %exchange.pattern(),
            "Created exchange"
        );
        Ok(exchange)
    }

    /// Unique exchange id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Contract the exchange was created with.
    pub fn contract(&self) -> &ExchangeContract {
        &self.inner.contract
    }

    /// Provider operation being invoked.
    pub fn operation(&self) -> &ServiceOperation {
        &self.inner.operation
    }

    /// Exchange pattern of the provider operation.
    pub fn pattern(&self) -> ExchangePattern {
        self.inner.operation.pattern()
    }

    /// Current phase, `None` before the first send.
    pub fn phase(&self) -> Option<ExchangePhase> {
        self.inner.status.lock().phase
    }

    /// Current state.
    pub fn state(&self) -> ExchangeState {
        self.inner.status.lock().state
    }

    /// A copy of the current message.
    pub fn message(&self) -> Option<Message> {
        self.inner.status.lock().message.clone()
    }

    /// Creates an empty message for use with this exchange.
    pub fn create_message(&self) -> Message {
        Message::new(Value::Null)
    }

    /// Locks the exchange context.
    pub fn context(&self) -> MutexGuard<'_, Context> {
        self.inner.context.lock()
    }

    /// Sets a property on the exchange context.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<Value>, scope: Scope) {
        self.inner.context.lock().set_property(name, value, scope);
    }

    /// Reads a property from the exchange context.
    pub fn property(&self, name: &str, scope: Scope) -> Option<Property> {
        self.inner.context.lock().property(name, scope).cloned()
    }

    /// The reference the exchange was created from.
    pub fn service(&self) -> &ServiceReference {
        &self.inner.reference
    }

    /// The bound dispatcher.
    pub fn dispatcher(&self) -> &BoxedDispatcher {
        &self.inner.dispatcher
    }

    /// The reply chain, if any.
    pub fn reply_chain(&self) -> Option<&HandlerChain> {
        self.inner.reply_chain.as_ref()
    }

    /// Service the exchange was addressed to, once known.
    pub fn target(&self) -> Option<Service> {
        self.inner.target.lock().clone()
    }

    pub(crate) fn set_target(&self, service: Service) {
        *self.inner.target.lock() = Some(service);
    }

    /// Replaces the current message without a phase change.
    pub(crate) fn replace_message(&self, message: Message) {
        self.inner.status.lock().message = Some(message);
    }

    /// Sends `message` and advances the phase.
    ///
    /// The first send moves to IN. On a request/reply exchange a second send
    /// moves to OUT; anything else is an illegal state.
    pub async fn send(&self, mut message: Message) -> ExchangeResult<()> {
        {
            let mut status = self.inner.status.lock();
            if status.state == ExchangeState::Fault {
                return Err(ExchangeError::illegal_state(
                    "send() not allowed for an exchange in FAULT state",
                ));
            }
            let next = match (status.phase, self.pattern()) {
                (None, _) => ExchangePhase::In,
                (Some(ExchangePhase::In), ExchangePattern::RequestReply) => ExchangePhase::Out,
                (Some(ExchangePhase::In), ExchangePattern::OneWay) => {
                    return Err(ExchangeError::illegal_state("ONE_WAY exchange has no OUT phase"));
                }
                (Some(ExchangePhase::Out), _) => {
                    return Err(ExchangeError::illegal_state(
                        "send() not allowed for an exchange in OUT phase",
                    ));
                }
            };
            self.associate_transform(next, message.context_mut());
            status.phase = Some(next);
            status.message = Some(message);
            debug!(exchange_id = %self.id(), phase = %next, "Exchange phase advanced");
        }
        self.send_internal().await
    }

    /// Sends a fault message, moving to OUT / FAULT.
    ///
    /// Fails before the first send and once the exchange has faulted.
    pub async fn send_fault(&self, message: Message) -> ExchangeResult<()> {
        {
            let mut status = self.inner.status.lock();
            if status.state == ExchangeState::Fault {
                return Err(ExchangeError::illegal_state(
                    "sendFault() not allowed for an exchange in FAULT state",
                ));
            }
            if status.phase.is_none() {
                return Err(ExchangeError::illegal_state(
                    "sendFault() not allowed before the first send()",
                ));
            }
            status.phase = Some(ExchangePhase::Out);
            status.state = ExchangeState::Fault;
            status.message = Some(message);
            debug!(exchange_id = %self.id(), "Exchange faulted");
        }
        self.send_internal().await
    }

    async fn send_internal(&self) -> ExchangeResult<()> {
        if self.state() == ExchangeState::Fault && self.inner.reply_chain.is_none() {
            let body = self.message().map(Message::into_body).unwrap_or_default();
            warn!(
                exchange_id = %self.id(),
                service = %self.service().name(),
                fault = %body,
                "Fault generated during exchange without a reply handler, dropping"
            );
            return Ok(());
        }
        self.inner.dispatcher.dispatch(self.clone()).await?;
        Ok(())
    }

    fn associate_transform(&self, phase: ExchangePhase, context: &mut Context) {
        let (from, to) = match phase {
            ExchangePhase::In => (
                self.inner.invoker.input_type.as_ref(),
                Some(self.inner.operation.input_type()),
            ),
            ExchangePhase::Out => (
                self.inner.operation.output_type(),
                self.inner.invoker.output_type.as_ref(),
            ),
        };
        if let (Some(from), Some(to)) = (from, to) {
            TransformSequence::from(from.clone())
                .to(to.clone())
                .associate_with(context);
        }
    }
}

impl PartialEq for Exchange {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Exchange {}

impl Hash for Exchange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.inner.status.lock();
        f.debug_struct("Exchange")
            .field("id", &self.inner.id)
            .field("service", self.inner.reference.name())
            .field("operation", &self.inner.operation.name())
            .field("phase", &status.phase)
            .field("state", &status.state)
            .field("has_reply_chain", &self.inner.reply_chain.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusResult;
    use crate::foundation::metadata::ServiceInterface;
    use crate::foundation::qname::QName;
    use crate::spi::bus::{DispatchChannel, Dispatcher};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    type Seen = (Option<ExchangePhase>, ExchangeState, Value);

    struct RecordingDispatcher {
        service: Service,
        channels: Vec<DispatchChannel>,
        seen: Mutex<Vec<Seen>>,
    }

    impl RecordingDispatcher {
        fn new(interface: ServiceInterface) -> Arc<Self> {
            let service = Service::new(
                QName::local("S").unwrap(),
                interface,
                vec![],
                QName::local("domain").unwrap(),
            );
            Arc::new(Self {
                channels: DispatchChannel::provision(service.interface()),
                service,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        fn service(&self) -> &Service {
            &self.service
        }

        fn channels(&self) -> &[DispatchChannel] {
            &self.channels
        }

        fn start(&self) -> BusResult<()> {
            Ok(())
        }

        fn stop(&self) -> BusResult<()> {
            Ok(())
        }

        fn is_running(&self) -> bool {
            true
        }

        async fn dispatch(&self, exchange: Exchange) -> BusResult<()> {
            let body = exchange.message().map(Message::into_body).unwrap_or_default();
            self.seen
                .lock()
                .push((exchange.phase(), exchange.state(), body));
            Ok(())
        }
    }

    fn qn(s: &str) -> QName {
        QName::parse(s).unwrap()
    }

    fn one_way() -> ServiceOperation {
        ServiceOperation::one_way("op1", qn("T1"))
    }

    fn request_reply() -> ServiceOperation {
        ServiceOperation::request_reply("op2", qn("T1"), qn("T2"))
    }

    fn exchange_for(op: ServiceOperation, with_reply: bool) -> (Exchange, Arc<RecordingDispatcher>) {
        let iface = ServiceInterface::new([op.clone()]).unwrap();
        let dispatcher = RecordingDispatcher::new(iface.clone());
        let reference = ServiceReference::new(qn("S"), iface);
        let exchange = Exchange::new(
            reference,
            ExchangeContract::between(&op, &op),
            dispatcher.clone(),
            with_reply.then(HandlerChain::new),
        )
        .unwrap();
        (exchange, dispatcher)
    }

    #[test]
    fn test_construction_requires_complete_contract() {
        let op = request_reply();
        let iface = ServiceInterface::new([op.clone()]).unwrap();
        let dispatcher = RecordingDispatcher::new(iface.clone());
        let reference = ServiceReference::new(qn("S"), iface);

        let err = Exchange::new(
            reference.clone(),
            ExchangeContract::new("op2", None, Some(op.clone())),
            dispatcher.clone(),
            Some(HandlerChain::new()),
        )
        .unwrap_err();
        assert_eq!(err, ExchangeError::MissingInvokerMetadata);

        let err = Exchange::new(
            reference.clone(),
            ExchangeContract::new("op2", Some(InvocationMetadata::from(&op)), None),
            dispatcher.clone(),
            Some(HandlerChain::new()),
        )
        .unwrap_err();
        assert_eq!(err, ExchangeError::MissingOperation("op2".into()));

        let err = Exchange::new(reference, ExchangeContract::between(&op, &op), dispatcher, None)
            .unwrap_err();
        assert_eq!(err, ExchangeError::MissingReplyChain("op2".into()));
    }

    #[tokio::test]
    async fn test_request_reply_phases() {
        let (exchange, dispatcher) = exchange_for(request_reply(), true);
        assert_eq!(exchange.phase(), None);

        exchange.send(Message::new("req")).await.unwrap();
        assert_eq!(exchange.phase(), Some(ExchangePhase::In));

        exchange.send(Message::new("resp")).await.unwrap();
        assert_eq!(exchange.phase(), Some(ExchangePhase::Out));
        assert_eq!(exchange.state(), ExchangeState::Ok);

        let err = exchange.send(Message::new("again")).await.unwrap_err();
        assert!(matches!(err, ExchangeError::IllegalState(_)));

        let seen = dispatcher.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (Some(ExchangePhase::In), ExchangeState::Ok, json!("req")),
                (Some(ExchangePhase::Out), ExchangeState::Ok, json!("resp")),
            ]
        );
    }

    #[tokio::test]
    async fn test_one_way_needs_no_reply_chain_and_sends_once() {
        let (exchange, dispatcher) = exchange_for(one_way(), false);
        exchange.send(Message::new("ping")).await.unwrap();
        assert_eq!(exchange.phase(), Some(ExchangePhase::In));

        let err = exchange.send(Message::new("pong")).await.unwrap_err();
        assert!(matches!(err, ExchangeError::IllegalState(_)));
        assert_eq!(dispatcher.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_before_send_fails() {
        let (exchange, dispatcher) = exchange_for(request_reply(), true);
        let err = assert_err!(exchange.send_fault(Message::new("boom")).await);
        assert!(matches!(err, ExchangeError::IllegalState(_)));
        assert_eq!(exchange.state(), ExchangeState::Ok);
        assert!(dispatcher.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fault_is_absorbing() {
        let (exchange, dispatcher) = exchange_for(request_reply(), true);
        assert_ok!(exchange.send(Message::new("req")).await);
        assert_ok!(exchange.send_fault(Message::new("boom")).await);
        assert_eq!(exchange.phase(), Some(ExchangePhase::Out));
        assert_eq!(exchange.state(), ExchangeState::Fault);

        assert_err!(exchange.send(Message::new("x")).await);
        assert_err!(exchange.send_fault(Message::new("y")).await);
        assert_eq!(exchange.state(), ExchangeState::Fault);
        assert_eq!(dispatcher.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_fault_without_reply_chain_is_dropped() {
        let (exchange, dispatcher) = exchange_for(one_way(), false);
        exchange.send(Message::new("ping")).await.unwrap();
        exchange.send_fault(Message::new("boom")).await.unwrap();

        assert_eq!(exchange.state(), ExchangeState::Fault);
        assert_eq!(dispatcher.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_send_associates_transform_sequences() {
        let caller = ServiceOperation::request_reply("op2", qn("A"), qn("B"));
        let provider = request_reply();
        let iface = ServiceInterface::new([provider.clone()]).unwrap();
        let dispatcher = RecordingDispatcher::new(iface.clone());
        let exchange = Exchange::new(
            ServiceReference::new(qn("S"), iface),
            ExchangeContract::between(&caller, &provider),
            dispatcher,
            Some(HandlerChain::new()),
        )
        .unwrap();

        exchange.send(Message::new("req")).await.unwrap();
        let seq = TransformSequence::of(exchange.message().unwrap().context()).unwrap();
        assert_eq!((seq.from_type(), seq.to_type()), (&qn("A"), &qn("T1")));

        exchange.send(Message::new("resp")).await.unwrap();
        let seq = TransformSequence::of(exchange.message().unwrap().context()).unwrap();
        assert_eq!((seq.from_type(), seq.to_type()), (&qn("T2"), &qn("B")));
    }

    #[tokio::test]
    async fn test_identity_and_context() {
        let (a, _) = exchange_for(one_way(), false);
        let (b, _) = exchange_for(one_way(), false);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(Uuid::parse_str(a.id()).is_ok());

        a.set_property("k", "v", Scope::Message);
        assert!(a.property("k", Scope::Exchange).is_none());
        assert_eq!(a.property("k", Scope::Message).unwrap().value(), &json!("v"));
        assert!(b.context().is_empty());
    }
}
