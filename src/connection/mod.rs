//! Connection Management
//!
//! This module owns the network side of the scout: the TCP transport and the
//! factory that creates exactly one shared connection per configuration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ConnectionFactory                         │
//! │        OnceCell<Arc<dyn Transport>> (single-flight)         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ first call only
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Connector                               │
//! │   TcpConnector: endpoint 1 ──fail──> endpoint 2 ──> ...     │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   RespConnection                            │
//! │  AUTH ─> SELECT on demand ─> write frame ─> parse reply     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use kvscout::config::Configuration;
//! use kvscout::connection::{ConnectionFactory, TcpConnector};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::parse("localhost:6379")?;
//! let factory = ConnectionFactory::new(config, false, Arc::new(TcpConnector));
//! let conn = factory.connection().await?;
//! conn.ping(0).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;

pub use client::RespConnection;
pub use factory::{ConnectionFactory, Connector, TcpConnector};
