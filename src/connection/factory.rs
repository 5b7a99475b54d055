//! Lazily Created Shared Connection
//!
//! A [`ConnectionFactory`] owns a configuration and hands out the one
//! connection built from it. The first call to
//! [`ConnectionFactory::connection`] connects; every later call returns a
//! clone of the same `Arc`. Concurrent first callers wait on the same
//! initialization, so at most one physical connect succeeds per factory.
//! A failed connect is not cached.

use crate::config::Configuration;
use crate::connection::client::RespConnection;
use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Opens transports for a configuration.
#[async_trait]
pub trait Connector: std::fmt::Debug + Send + Sync {
    async fn connect(&self, config: &Configuration) -> TransportResult<Arc<dyn Transport>>;
}

/// Connects over TCP, trying the configured endpoints in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &Configuration) -> TransportResult<Arc<dyn Transport>> {
        let mut failures = Vec::new();

        for endpoint in config.endpoints() {
            match RespConnection::connect(endpoint, config).await {
                Ok(connection) => return Ok(Arc::new(connection)),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Endpoint unavailable");
                    failures.push(format!("{}: {}", endpoint, e));
                }
            }
        }

        Err(TransportError::Unreachable(failures.join("; ")))
    }
}

/// Memoizes the single connection for one configuration.
#[derive(Debug)]
pub struct ConnectionFactory {
    config: Configuration,
    connector: Arc<dyn Connector>,
    handle: OnceCell<Arc<dyn Transport>>,
}

impl ConnectionFactory {
    /// Creates a factory for `config`, overriding its admin flag.
    pub fn new(config: Configuration, allow_admin: bool, connector: Arc<dyn Connector>) -> Self {
        Self {
            config: config.with_allow_admin(allow_admin),
            connector,
            handle: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Returns the shared connection, connecting on first use.
    pub async fn connection(&self) -> TransportResult<Arc<dyn Transport>> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                debug!(
                    endpoints = self.config.endpoints().len(),
                    db = self.config.default_database(),
                    admin = self.config.allow_admin(),
                    "Opening shared connection"
                );
                self.connector.connect(&self.config).await
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Whether the connection has been established.
    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }
}
