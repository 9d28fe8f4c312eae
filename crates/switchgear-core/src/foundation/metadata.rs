//! Service metadata: exchange patterns, operations and catalogs.
//!
//! A [`ServiceInterface`] is the operation catalog of a service. Each
//! [`ServiceOperation`] is tagged with an [`ExchangePattern`], which decides
//! whether an exchange needs a reply chain and whether a bus provisions an
//! output channel.
//!
//! Catalogs usually come from an introspection step outside the engine. That
//! step hands over [`OperationDescriptor`]s, and
//! [`ServiceInterface::from_descriptors`] applies the mapping rules.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::foundation::qname::QName;

// =============================================================================
// Patterns, phases and states
// =============================================================================

/// Message exchange pattern of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExchangePattern {
    /// Fire and forget: one IN delivery.
    OneWay,
    /// Request followed by a reply: IN then OUT.
    RequestReply,
}

impl fmt::Display for ExchangePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OneWay => "ONE_WAY",
            Self::RequestReply => "REQUEST_REPLY",
        })
    }
}

/// Phase of an exchange. A fresh exchange has no phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangePhase {
    /// Request travelling towards the provider.
    In,
    /// Reply or fault travelling back to the caller.
    Out,
}

impl fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "IN",
            Self::Out => "OUT",
        })
    }
}

/// Outcome state of an exchange. `Fault` is absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeState {
    /// No fault so far.
    #[default]
    Ok,
    /// A fault was sent.
    Fault,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Fault => "FAULT",
        })
    }
}

// =============================================================================
// ServiceOperation
// =============================================================================

/// One named operation of a service.
///
/// Request/reply operations always carry an output type and one-way
/// operations never do; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceOperation {
    name: String,
    pattern: ExchangePattern,
    input: QName,
    output: Option<QName>,
}

impl ServiceOperation {
    /// Default input type name used by generic operations.
    pub const DEFAULT_INPUT: &'static str = "in";
    /// Default output type name used by generic operations.
    pub const DEFAULT_OUTPUT: &'static str = "out";

    /// Creates a one-way operation.
    pub fn one_way(name: impl Into<String>, input: QName) -> Self {
        Self {
            name: name.into(),
            pattern: ExchangePattern::OneWay,
            input,
            output: None,
        }
    }

    /// Creates a request/reply operation.
    pub fn request_reply(name: impl Into<String>, input: QName, output: QName) -> Self {
        Self {
            name: name.into(),
            pattern: ExchangePattern::RequestReply,
            input,
            output: Some(output),
        }
    }

    /// Creates a request/reply operation with the generic `in`/`out` types.
    pub fn generic_in_out(name: impl Into<String>) -> Self {
        Self::request_reply(
            name,
            generic_type(Self::DEFAULT_INPUT),
            generic_type(Self::DEFAULT_OUTPUT),
        )
    }

    /// Creates a one-way operation with the generic `in` type.
    pub fn generic_in_only(name: impl Into<String>) -> Self {
        Self::one_way(name, generic_type(Self::DEFAULT_INPUT))
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exchange pattern.
    pub fn pattern(&self) -> ExchangePattern {
        self.pattern
    }

    /// Input message type.
    pub fn input_type(&self) -> &QName {
        &self.input
    }

    /// Output message type, present only for request/reply.
    pub fn output_type(&self) -> Option<&QName> {
        self.output.as_ref()
    }
}

fn generic_type(local: &'static str) -> QName {
    QName::from_static(local)
}

// =============================================================================
// Introspection boundary
// =============================================================================

/// Raw operation description handed over by an introspection step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Operation name.
    pub name: String,
    /// Declared parameter types.
    pub parameters: Vec<QName>,
    /// Declared return type; `None` makes the operation one-way.
    pub returns: Option<QName>,
}

impl TryFrom<OperationDescriptor> for ServiceOperation {
    type Error = MetadataError;

    fn try_from(desc: OperationDescriptor) -> Result<Self, Self::Error> {
        let count = desc.parameters.len();
        let mut params = desc.parameters.into_iter();
        let (Some(input), None) = (params.next(), params.next()) else {
            return Err(MetadataError::UnsupportedParameters {
                operation: desc.name,
                count,
            });
        };
        Ok(match desc.returns {
            Some(output) => ServiceOperation::request_reply(desc.name, input, output),
            None => ServiceOperation::one_way(desc.name, input),
        })
    }
}

// =============================================================================
// ServiceInterface
// =============================================================================

/// Operation catalog of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInterface {
    operations: BTreeMap<String, ServiceOperation>,
}

impl ServiceInterface {
    /// Name of the single operation in [`default_in_out`](Self::default_in_out).
    pub const DEFAULT_OPERATION: &'static str = "process";

    /// Builds a catalog, rejecting duplicate names.
    pub fn new(operations: impl IntoIterator<Item = ServiceOperation>) -> Result<Self, MetadataError> {
        let mut map = BTreeMap::new();
        for op in operations {
            let name = op.name().to_string();
            if map.insert(name.clone(), op).is_some() {
                return Err(MetadataError::DuplicateOperation(name));
            }
        }
        Ok(Self { operations: map })
    }

    /// Builds a catalog from introspected descriptors.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = OperationDescriptor>,
    ) -> Result<Self, MetadataError> {
        let ops = descriptors
            .into_iter()
            .map(ServiceOperation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ops)
    }

    /// The catalog used when a service is registered without one.
    pub fn default_in_out() -> Self {
        let op = ServiceOperation::generic_in_out(Self::DEFAULT_OPERATION);
        Self {
            operations: BTreeMap::from([(op.name().to_string(), op)]),
        }
    }

    /// A single one-way operation with the generic input type.
    pub fn default_in_only() -> Self {
        let op = ServiceOperation::generic_in_only(Self::DEFAULT_OPERATION);
        Self {
            operations: BTreeMap::from([(op.name().to_string(), op)]),
        }
    }

    /// Looks up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&ServiceOperation> {
        self.operations.get(name)
    }

    /// Iterates operations in name order.
    pub fn operations(&self) -> impl Iterator<Item = &ServiceOperation> {
        self.operations.values()
    }

    /// Returns `true` if any operation is request/reply.
    pub fn has_request_reply(&self) -> bool {
        self.operations
            .values()
            .any(|op| op.pattern() == ExchangePattern::RequestReply)
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` for an empty catalog.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for ServiceInterface {
    fn default() -> Self {
        Self::default_in_out()
    }
}

// =============================================================================
// Contract
// =============================================================================

/// Types the caller declares for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationMetadata {
    /// Type of the request body the caller sends.
    pub input_type: Option<QName>,
    /// Type of the reply body the caller expects.
    pub output_type: Option<QName>,
}

impl From<&ServiceOperation> for InvocationMetadata {
    fn from(op: &ServiceOperation) -> Self {
        Self {
            input_type: Some(op.input_type().clone()),
            output_type: op.output_type().cloned(),
        }
    }
}

/// Pairs caller-side metadata with the resolved provider operation.
///
/// Either half may be missing when assembled; the exchange rejects such a
/// contract at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeContract {
    operation_name: String,
    invoker: Option<InvocationMetadata>,
    operation: Option<ServiceOperation>,
}

impl ExchangeContract {
    /// Creates a contract for the operation `operation_name`.
    pub fn new(
        operation_name: impl Into<String>,
        invoker: Option<InvocationMetadata>,
        operation: Option<ServiceOperation>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            invoker,
            operation,
        }
    }

    /// Creates a complete contract from both operation views.
    pub fn between(invoker: &ServiceOperation, provider: &ServiceOperation) -> Self {
        Self::new(
            invoker.name(),
            Some(InvocationMetadata::from(invoker)),
            Some(provider.clone()),
        )
    }

    /// Name of the requested operation.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Caller-side invocation metadata.
    pub fn invoker_metadata(&self) -> Option<&InvocationMetadata> {
        self.invoker.as_ref()
    }

    /// Provider-side operation.
    pub fn service_operation(&self) -> Option<&ServiceOperation> {
        self.operation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(s: &str) -> QName {
        QName::parse(s).unwrap()
    }

    #[test]
    fn test_output_type_follows_pattern() {
        let one_way = ServiceOperation::one_way("op1", qn("T1"));
        assert_eq!(one_way.pattern(), ExchangePattern::OneWay);
        assert!(one_way.output_type().is_none());

        let rr = ServiceOperation::request_reply("op2", qn("T1"), qn("T2"));
        assert_eq!(rr.pattern(), ExchangePattern::RequestReply);
        assert_eq!(rr.output_type(), Some(&qn("T2")));
    }

    #[test]
    fn test_default_catalog_is_request_reply() {
        let iface = ServiceInterface::default_in_out();
        let op = iface.operation("process").unwrap();
        assert_eq!(op.pattern(), ExchangePattern::RequestReply);
        assert_eq!(op.input_type(), &qn("in"));
        assert_eq!(op.output_type(), Some(&qn("out")));
        assert!(iface.has_request_reply());
        assert!(!ServiceInterface::default_in_only().has_request_reply());
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let err = ServiceInterface::new([
            ServiceOperation::generic_in_only("a"),
            ServiceOperation::generic_in_out("a"),
        ])
        .unwrap_err();
        assert_eq!(err, MetadataError::DuplicateOperation("a".into()));
    }

    #[test]
    fn test_descriptors_map_to_patterns() {
        let iface = ServiceInterface::from_descriptors([
            OperationDescriptor {
                name: "notify".into(),
                parameters: vec![qn("Event")],
                returns: None,
            },
            OperationDescriptor {
                name: "lookup".into(),
                parameters: vec![qn("Query")],
                returns: Some(qn("Result")),
            },
        ])
        .unwrap();
        assert_eq!(iface.operation("notify").unwrap().pattern(), ExchangePattern::OneWay);
        assert_eq!(
            iface.operation("lookup").unwrap().pattern(),
            ExchangePattern::RequestReply
        );
    }

    #[test]
    fn test_descriptor_parameter_count_enforced() {
        for params in [vec![], vec![qn("A"), qn("B")]] {
            let err = ServiceInterface::from_descriptors([OperationDescriptor {
                name: "bad".into(),
                parameters: params.clone(),
                returns: None,
            }])
            .unwrap_err();
            assert_eq!(
                err,
                MetadataError::UnsupportedParameters {
                    operation: "bad".into(),
                    count: params.len(),
                }
            );
        }
    }

    #[test]
    fn test_contract_between() {
        let caller = ServiceOperation::request_reply("op2", qn("A"), qn("B"));
        let provider = ServiceOperation::request_reply("op2", qn("T1"), qn("T2"));
        let contract = ExchangeContract::between(&caller, &provider);
        let invoker = contract.invoker_metadata().unwrap();
        assert_eq!(invoker.input_type, Some(qn("A")));
        assert_eq!(invoker.output_type, Some(qn("B")));
        assert_eq!(contract.service_operation(), Some(&provider));
    }
}
