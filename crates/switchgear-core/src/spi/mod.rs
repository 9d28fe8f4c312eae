//! Service provider interfaces: buses, dispatchers and registries.

pub mod bus;
pub mod delivery;
pub mod registry;
