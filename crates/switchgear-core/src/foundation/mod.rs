//! Foundation layer: names, metadata, context and messages.

pub mod context;
pub mod message;
pub mod metadata;
pub mod qname;
