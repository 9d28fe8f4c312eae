//! Handlers and handler chains.

pub mod addressing;
pub mod chain;
pub mod system;
pub mod traits;
