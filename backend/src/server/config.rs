//! HTTP server configuration object.

use std::net::SocketAddr;
use std::sync::Arc;

use postboard::domain::graph::Executor;

/// Everything the listener needs once storage is ready.
pub struct ServerConfig {
    pub(crate) executor: Arc<Executor>,
    pub(crate) bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Serve `executor` on `bind_addr`.
    #[must_use]
    pub fn new(executor: Arc<Executor>, bind_addr: SocketAddr) -> Self {
        Self {
            executor,
            bind_addr,
        }
    }

    /// Return the socket address the server will bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
