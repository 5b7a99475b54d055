//! # kvscout - Capability Probing and Keyspace Scanning
//!
//! kvscout connects to a Redis-compatible server, works out what it can do,
//! and walks the keyspace of any of its logical databases without giving up
//! on the first bad key.
//!
//! ## Features
//!
//! - **Lazy probing**: an [`Instance`] does no I/O until a server fact is
//!   needed, then probes exactly once, even under concurrent first access
//! - **Database discovery**: finds the highest answering database index
//! - **Fault-tolerant scans**: per-key failures are skipped until a fixed
//!   budget runs out
//! - **Typed readers**: strings, lists, sets, sorted sets and hashes are read
//!   through [`KeyDescriptor`] with type checks before any I/O
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               kvscout                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Instance   │───>│ Connection  │───>│ TcpConnector│──> endpoints     │
//! │  │  (probe)    │    │  Factory    │    │             │                  │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘                  │
//! │         │                                     │                         │
//! │         ▼                                     ▼                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Database   │───>│ KeyScanner  │    │RespConnection│<──> RESP2      │
//! │  │  (handle)   │    │ (budgeted)  │    │  + parser   │                  │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘                  │
//! │         │                  │                                            │
//! │         ▼                  ▼                                            │
//! │  ┌──────────────────────────────────────────────┐                       │
//! │  │   KeyDescriptor: type, expiry, last access   │                       │
//! │  │   readers: GET, LRANGE, SSCAN, HSCAN, ZSCAN  │                       │
//! │  └──────────────────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use kvscout::{Instance, ScanOptions};
//!
//! # async fn demo() -> Result<(), kvscout::Error> {
//! let instance = Instance::new("localhost:6379")?;
//! println!("databases 0..={}", instance.max_database().await?);
//!
//! let options = ScanOptions::new().max_count(100).include_expiry(true);
//! for descriptor in instance.scan_database(0, &options).await?.values() {
//!     println!("{}", descriptor);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`probe`]: the lazily probed [`Instance`]
//! - [`scanner`]: budgeted keyspace scan
//! - [`descriptor`]: per-key metadata and typed readers
//! - [`database`]: a connection bound to one database index
//! - [`transport`]: the `Transport` seam and INFO parsing
//! - [`connection`]: TCP transport and the shared-connection factory
//! - [`protocol`]: RESP2 values and the incremental reply parser
//! - [`config`]: configuration strings
//! - [`features`]: version-gated server features
//!
//! ## Design Highlights
//!
//! ### One connection, many databases
//!
//! Every [`Database`] handle shares the probe's connection. The transport
//! issues `SELECT` only when a request targets a different index than the
//! session currently has selected.
//!
//! ### Sequential metadata
//!
//! The scanner sends one request at a time. A full scan of a large database
//! costs several round trips per key, but never floods the server.

pub mod clock;
pub mod config;
pub mod connection;
pub mod database;
pub mod descriptor;
pub mod error;
pub mod features;
pub mod probe;
pub mod protocol;
pub mod scanner;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use clock::{Clock, SystemClock};
pub use config::{Configuration, Endpoint};
pub use database::Database;
pub use descriptor::{KeyContents, KeyDescriptor, KeyType};
pub use error::{Error, ProbeStage, Result};
pub use features::{ServerFeatures, ServerVersion};
pub use probe::{Instance, ProbeResult, ProbeState};
pub use scanner::{KeyScanner, ScanOptions, ScanResult};
pub use transport::{Transport, TransportError};

/// The default server port
pub const DEFAULT_PORT: u16 = 6379;

/// The host used when none is given
pub const DEFAULT_HOST: &str = "localhost";

/// Version of kvscout
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
