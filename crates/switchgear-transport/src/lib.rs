//! # Switchgear Transport
//!
//! Exchange bus implementations for the Switchgear service bus.
//!
//! | bus                  | name    | delivery                                  |
//! |----------------------|---------|-------------------------------------------|
//! | [`LocalExchangeBus`] | `local` | inline, on the task calling `send`        |
//! | [`QueueExchangeBus`] | `queue` | per-service queues drained by a worker    |
//!
//! Both implement [`ExchangeBus`](switchgear_core::ExchangeBus) and are
//! interchangeable without changing call sites.

mod common;
pub mod local;
pub mod queue;

pub use local::{LocalDispatcher, LocalExchangeBus};
pub use queue::{DRAIN_ON_STOP, QueueDispatcher, QueueExchangeBus};
