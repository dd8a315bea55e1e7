//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on the domain executor and remain testable without I/O.

use std::sync::Arc;

use crate::domain::graph::Executor;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub executor: Arc<Executor>,
}

impl HttpState {
    /// Construct state around a shared executor.
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }
}
