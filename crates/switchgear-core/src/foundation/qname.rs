//! Qualified names.
//!
//! Services, domains and message types are all identified by a [`QName`]:
//! an optional namespace plus a local part, written `{namespace}local` or
//! just `local`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MetadataError;

/// A namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: Option<String>,
    local: String,
}

impl QName {
    /// Creates a name without a namespace.
    pub fn local(local: impl Into<String>) -> Result<Self, MetadataError> {
        let local = local.into();
        validate_local(&local, &local)?;
        Ok(Self {
            namespace: None,
            local,
        })
    }

    /// Creates a name inside `namespace`.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Result<Self, MetadataError> {
        let namespace = namespace.into();
        let local = local.into();
        validate_local(&local, &local)?;
        if namespace.contains(['{', '}']) {
            return Err(MetadataError::invalid_name(namespace, "namespace contains braces"));
        }
        Ok(Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            local,
        })
    }

    /// Builds a local name from a literal known to be valid.
    pub(crate) fn from_static(local: &'static str) -> Self {
        Self {
            namespace: None,
            local: local.to_string(),
        }
    }

    /// Parses `{namespace}local` or `local`.
    pub fn parse(input: &str) -> Result<Self, MetadataError> {
        match input.strip_prefix('{') {
            Some(rest) => {
                let Some((namespace, local)) = rest.split_once('}') else {
                    return Err(MetadataError::invalid_name(input, "unterminated namespace"));
                };
                if namespace.contains('{') {
                    return Err(MetadataError::invalid_name(input, "nested namespace"));
                }
                validate_local(input, local)?;
                Ok(Self {
                    namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
                    local: local.to_string(),
                })
            }
            None => Self::local(input),
        }
    }

    /// Returns the namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the local part.
    pub fn local_part(&self) -> &str {
        &self.local
    }
}

fn validate_local(input: &str, local: &str) -> Result<(), MetadataError> {
    if local.is_empty() {
        return Err(MetadataError::invalid_name(input, "empty local part"));
    }
    if local.chars().any(char::is_whitespace) {
        return Err(MetadataError::invalid_name(input, "whitespace in local part"));
    }
    if local.contains(['{', '}']) {
        return Err(MetadataError::invalid_name(input, "stray brace in local part"));
    }
    Ok(())
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl FromStr for QName {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for QName {
    type Error = MetadataError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Conversion into a [`QName`], parsing string forms.
pub trait IntoQName {
    /// Performs the conversion.
    fn into_qname(self) -> Result<QName, MetadataError>;
}

impl IntoQName for QName {
    fn into_qname(self) -> Result<QName, MetadataError> {
        Ok(self)
    }
}

impl IntoQName for &QName {
    fn into_qname(self) -> Result<QName, MetadataError> {
        Ok(self.clone())
    }
}

impl IntoQName for &str {
    fn into_qname(self) -> Result<QName, MetadataError> {
        QName::parse(self)
    }
}

impl IntoQName for String {
    fn into_qname(self) -> Result<QName, MetadataError> {
        QName::parse(&self)
    }
}

impl IntoQName for &String {
    fn into_qname(self) -> Result<QName, MetadataError> {
        QName::parse(self)
    }
}
