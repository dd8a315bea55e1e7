//! HTTP inbound adapter exposing the GraphQL endpoint and health checks.

pub mod error;
pub mod graphql;
pub mod health;
pub mod state;

pub use error::ApiResult;
