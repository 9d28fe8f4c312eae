//! Handlers making up a domain's default chain.
//!
//! [`default_chain`] assembles them in a fixed order around the provider
//! placeholder:
//!
//! | slot                          | handler                                 |
//! |-------------------------------|-----------------------------------------|
//! | `transaction-pre-invoke`      | [`TransactionHandler::pre_invoke`]      |
//! | `generic-policy`              | [`PolicyHandler`]                       |
//! | `validation-before-transform` | [`ValidateHandler::before_transform`]   |
//! | `transformation`              | [`TransformHandler`]                    |
//! | `validation-after-transform`  | [`ValidateHandler::after_transform`]    |
//! | `provider`                    | placeholder                             |
//! | `transaction-post-invoke`     | [`TransactionHandler::post_invoke`]     |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{HandlerError, HandlerResult};
use crate::exchange::Exchange;
use crate::foundation::context::Scope;
use crate::foundation::metadata::ExchangePhase;
use crate::handler::chain::{HandlerChain, PROVIDER_HANDLER, Slot};
use crate::handler::traits::{BoxedHandler, ExchangeHandler};
use crate::transform::{TransformSequence, TransformerRegistry};
use crate::validate::ValidatorRegistry;

/// Slot name of the pre-invoke transaction handler.
pub const TRANSACTION_PRE_INVOKE: &str = "transaction-pre-invoke";
/// Slot name of the policy handler.
pub const GENERIC_POLICY: &str = "generic-policy";
/// Slot name of the validation handler running before transformation.
pub const VALIDATION_BEFORE_TRANSFORM: &str = "validation-before-transform";
/// Slot name of the transformation handler.
pub const TRANSFORMATION: &str = "transformation";
/// Slot name of the validation handler running after transformation.
pub const VALIDATION_AFTER_TRANSFORM: &str = "validation-after-transform";
/// Slot name of the post-invoke transaction handler.
pub const TRANSACTION_POST_INVOKE: &str = "transaction-post-invoke";

/// Exchange property recording transaction demarcation.
pub const TRANSACTION_PROPERTY: &str = "switchgear.transaction";
/// Exchange property listing the policy tokens required by the provider.
pub const POLICY_REQUIRED_PROPERTY: &str = "switchgear.policy.required";

/// Builds the default chain template with an empty provider slot.
pub fn default_chain(
    transformers: Arc<TransformerRegistry>,
    validators: Arc<ValidatorRegistry>,
) -> HandlerChain {
    let pre: BoxedHandler = Arc::new(TransactionHandler::pre_invoke());
    let policy: BoxedHandler = Arc::new(PolicyHandler);
    let validate_before: BoxedHandler =
        Arc::new(ValidateHandler::before_transform(validators.clone()));
    let transform: BoxedHandler = Arc::new(TransformHandler::new(transformers));
    let validate_after: BoxedHandler = Arc::new(ValidateHandler::after_transform(validators));
    let post: BoxedHandler = Arc::new(TransactionHandler::post_invoke());

    [
        (TRANSACTION_PRE_INVOKE, Slot::Handler(pre)),
        (GENERIC_POLICY, Slot::Handler(policy)),
        (VALIDATION_BEFORE_TRANSFORM, Slot::Handler(validate_before)),
        (TRANSFORMATION, Slot::Handler(transform)),
        (VALIDATION_AFTER_TRANSFORM, Slot::Handler(validate_after)),
        (PROVIDER_HANDLER, Slot::Placeholder),
        (TRANSACTION_POST_INVOKE, Slot::Handler(post)),
    ]
    .into_iter()
    .collect()
}

// =============================================================================
// Transaction
// =============================================================================

/// Where a [`TransactionHandler`] sits relative to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    /// Before the provider runs.
    PreInvoke,
    /// After the provider returns.
    PostInvoke,
}

/// Records transaction demarcation in the exchange context.
#[derive(Debug, Clone, Copy)]
pub struct TransactionHandler {
    stage: TransactionStage,
}

impl TransactionHandler {
    /// Marks the transaction `active`.
    pub fn pre_invoke() -> Self {
        Self {
            stage: TransactionStage::PreInvoke,
        }
    }

    /// Marks the transaction `committed`.
    pub fn post_invoke() -> Self {
        Self {
            stage: TransactionStage::PostInvoke,
        }
    }

    /// Stage of this instance.
    pub fn stage(&self) -> TransactionStage {
        self.stage
    }
}

#[async_trait]
impl ExchangeHandler for TransactionHandler {
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult {
        let status = match self.stage {
            TransactionStage::PreInvoke => "active",
            TransactionStage::PostInvoke => "committed",
        };
        trace!(exchange_id = %exchange.id(), status, "Transaction demarcation");
        exchange.set_property(TRANSACTION_PROPERTY, status, Scope::Exchange);
        Ok(())
    }

    async fn handle_fault(&self, exchange: &Exchange) {
        exchange.set_property(TRANSACTION_PROPERTY, "rolled-back", Scope::Exchange);
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Publishes the provider's policy requirements on the IN phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyHandler;

#[async_trait]
impl ExchangeHandler for PolicyHandler {
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult {
        if exchange.phase() != Some(ExchangePhase::In) {
            return Ok(());
        }
        let required: Vec<Value> = exchange
            .dispatcher()
            .service()
            .policies()
            .iter()
            .map(|p| Value::from(p.as_str()))
            .collect();
        exchange.set_property(POLICY_REQUIRED_PROPERTY, required, Scope::Exchange);
        Ok(())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validates one side of the message's transform sequence.
#[derive(Debug, Clone)]
pub struct ValidateHandler {
    validators: Arc<ValidatorRegistry>,
    after_transform: bool,
}

impl ValidateHandler {
    /// Validates the sequence's source type.
    pub fn before_transform(validators: Arc<ValidatorRegistry>) -> Self {
        Self {
            validators,
            after_transform: false,
        }
    }

    /// Validates the sequence's target type.
    pub fn after_transform(validators: Arc<ValidatorRegistry>) -> Self {
        Self {
            validators,
            after_transform: true,
        }
    }
}

#[async_trait]
impl ExchangeHandler for ValidateHandler {
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult {
        let Some(message) = exchange.message() else {
            return Ok(());
        };
        let Some(sequence) = TransformSequence::of(message.context()) else {
            return Ok(());
        };
        let type_name = if self.after_transform {
            sequence.to_type()
        } else {
            sequence.from_type()
        };
        let Some(validator) = self.validators.find(type_name) else {
            return Ok(());
        };
        validator
            .validate(message.body())
            .map_err(|e| HandlerError::Validation {
                type_name: type_name.to_string(),
                reason: e.to_string(),
            })
    }
}

// =============================================================================
// Transformation
// =============================================================================

/// Applies the registered transformer for the message's sequence.
#[derive(Debug, Clone)]
pub struct TransformHandler {
    transformers: Arc<TransformerRegistry>,
}

impl TransformHandler {
    /// Creates a handler backed by `transformers`.
    pub fn new(transformers: Arc<TransformerRegistry>) -> Self {
        Self { transformers }
    }
}

#[async_trait]
impl ExchangeHandler for TransformHandler {
    async fn handle_message(&self, exchange: &Exchange) -> HandlerResult {
        let Some(mut message) = exchange.message() else {
            return Ok(());
        };
        let Some(sequence) = TransformSequence::of(message.context()) else {
            return Ok(());
        };
        if sequence.is_identity() {
            return Ok(());
        }

        let (from, to) = (sequence.from_type(), sequence.to_type());
        let fail = |reason: String| HandlerError::Transform {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };
        let transformer = self
            .transformers
            .find(from, to)
            .ok_or_else(|| fail("no transformer registered".to_string()))?;
        let body = transformer
            .transform(message.body().clone())
            .map_err(|e| fail(e.to_string()))?;

        debug!(exchange_id = %exchange.id(), %from, %to, "Transformed message");
        message.set_body(body);
        exchange.replace_message(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BusResult, TransformError};
    use crate::foundation::message::Message;
    use crate::foundation::metadata::{ExchangeContract, ServiceInterface, ServiceOperation};
    use crate::foundation::qname::QName;
    use crate::handler::traits::handler_fn;
    use crate::service::{Policy, Service, ServiceReference};
    use crate::spi::bus::{DispatchChannel, Dispatcher};
    use crate::transform::transformer_fn;
    use crate::validate::validator_fn;
    use serde_json::json;

    struct ChainDispatcher {
        service: Service,
        chain: HandlerChain,
    }

    #[async_trait]
    impl Dispatcher for ChainDispatcher {
        fn service(&self) -> &Service {
            &self.service
        }

        fn channels(&self) -> &[DispatchChannel] {
            &[DispatchChannel::Input]
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
            let _ = self.chain.handle(&exchange).await;
            Ok(())
        }
    }

    fn qn(s: &str) -> QName {
        QName::parse(s).unwrap()
    }

    struct Fixture {
        transformers: Arc<TransformerRegistry>,
        validators: Arc<ValidatorRegistry>,
        seen: Arc<parking_lot::Mutex<Vec<Value>>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                transformers: Arc::new(TransformerRegistry::new()),
                validators: Arc::new(ValidatorRegistry::new()),
                seen: Arc::default(),
            }
        }

        /// One-way exchange from caller type `A` to provider type `B`.
        fn exchange(&self, policies: Vec<Policy>) -> Exchange {
            let mut chain = default_chain(self.transformers.clone(), self.validators.clone());
            let seen = self.seen.clone();
            chain
                .replace(
                    PROVIDER_HANDLER,
                    handler_fn(move |ex: Exchange| {
                        let seen = seen.clone();
                        async move {
                            if let Some(m) = ex.message() {
                                seen.lock().push(m.into_body());
                            }
                            Ok(())
                        }
                    }),
                )
                .unwrap();

            let provider = ServiceOperation::one_way("op", qn("B"));
            let caller = ServiceOperation::one_way("op", qn("A"));
            let iface = ServiceInterface::new([provider.clone()]).unwrap();
            let service = Service::new(qn("S"), iface.clone(), policies, qn("d"));
            Exchange::new(
                ServiceReference::new(qn("S"), iface),
                ExchangeContract::between(&caller, &provider),
                Arc::new(ChainDispatcher { service, chain }),
                None,
            )
            .unwrap()
        }
    }

    #[test]
    fn test_default_chain_order() {
        let chain = default_chain(
            Arc::new(TransformerRegistry::new()),
            Arc::new(ValidatorRegistry::new()),
        );
        assert_eq!(
            chain.names(),
            vec![
                TRANSACTION_PRE_INVOKE,
                GENERIC_POLICY,
                VALIDATION_BEFORE_TRANSFORM,
                TRANSFORMATION,
                VALIDATION_AFTER_TRANSFORM,
                PROVIDER_HANDLER,
                TRANSACTION_POST_INVOKE,
            ]
        );
        assert!(matches!(chain.get(PROVIDER_HANDLER), Some(Slot::Placeholder)));
        assert!(matches!(chain.get(TRANSFORMATION), Some(Slot::Handler(_))));
    }

    #[tokio::test]
    async fn test_transform_runs_before_provider() {
        let fx = Fixture::new();
        fx.transformers.add(transformer_fn(qn("A"), qn("B"), |body| {
            Ok(json!({ "converted": body }))
        }));
        let exchange = fx.exchange(vec![]);

        exchange.send(Message::new("ping")).await.unwrap();
        assert_eq!(*fx.seen.lock(), vec![json!({ "converted": "ping" })]);
        assert_eq!(
            exchange.property(TRANSACTION_PROPERTY, Scope::Exchange).unwrap().value(),
            &json!("committed")
        );
    }

    #[tokio::test]
    async fn test_missing_transformer_faults_chain() {
        let fx = Fixture::new();
        let exchange = fx.exchange(vec![]);

        exchange.send(Message::new("ping")).await.unwrap();
        assert!(fx.seen.lock().is_empty());
        assert_eq!(
            exchange.property(TRANSACTION_PROPERTY, Scope::Exchange).unwrap().value(),
            &json!("rolled-back")
        );
    }

    #[tokio::test]
    async fn test_validation_wraps_transformation() {
        let fx = Fixture::new();
        fx.transformers.add(transformer_fn(qn("A"), qn("B"), |body| {
            Ok(json!({ "converted": body }))
        }));
        fx.validators.add(validator_fn(qn("B"), |body| {
            if body.get("converted").is_some() {
                Ok(())
            } else {
                Err(TransformError::new("not converted"))
            }
        }));
        fx.validators.add(validator_fn(qn("A"), |body| {
            body.as_str()
                .map(|_| ())
                .ok_or_else(|| TransformError::new("expected a string"))
        }));

        let exchange = fx.exchange(vec![]);
        exchange.send(Message::new("ping")).await.unwrap();
        assert_eq!(fx.seen.lock().len(), 1);

        let rejected = fx.exchange(vec![]);
        rejected.send(Message::new(42)).await.unwrap();
        assert_eq!(fx.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_policy_requirements_published_on_in() {
        let fx = Fixture::new();
        fx.transformers.add(transformer_fn(qn("A"), qn("B"), |body| Ok(body)));
        let exchange = fx.exchange(vec![Policy::new("sign"), Policy::new("encrypt")]);

        exchange.send(Message::new("ping")).await.unwrap();
        assert_eq!(
            exchange
                .property(POLICY_REQUIRED_PROPERTY, Scope::Exchange)
                .unwrap()
                .value(),
            &json!(["sign", "encrypt"])
        );
    }
}
