//! Domain ports for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod entity_store;

#[cfg(test)]
pub use entity_store::MockEntityStore;
pub use entity_store::{Collection, EntityStore, EntityStoreError};
