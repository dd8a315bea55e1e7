//! SQLite persistence adapters using Diesel ORM.
//!
//! This module provides the concrete implementation of the domain's
//! `EntityStore` port backed by SQLite via the Diesel ORM, with async support
//! through `diesel-async` and `bb8` connection pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: the store only translates between Diesel models and
//!   domain types. No business logic resides here.
//! - **Internal models**: Diesel row structs (`models.rs`) and schema
//!   definitions (`schema.rs`) are internal implementation details, never
//!   exposed to the domain layer.
//! - **Strongly typed errors**: all database errors are mapped to
//!   `EntityStoreError`.
//!
//! # Example
//!
//! ```ignore
//! use postboard::outbound::persistence::{DbPool, DieselEntityStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postboard.db")).await?;
//! let store = DieselEntityStore::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_entity_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_entity_store::DieselEntityStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
