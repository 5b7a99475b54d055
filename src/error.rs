//! Error types for probing and scanning.
//!
//! Probe failures carry the [`ProbeStage`] they happened in and are never
//! retried by the library. Per-key failures during a scan are absorbed until
//! the failure budget runs out, at which point [`Error::ScanAborted`] wraps
//! the error that tipped it over.

use crate::descriptor::KeyType;
use crate::transport::TransportError;
use std::fmt;

/// Step of the probe sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    Connect,
    Ping,
    Info,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeStage::Connect => "connect",
            ProbeStage::Ping => "ping",
            ProbeStage::Info => "info",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration is unusable, e.g. it names no endpoints.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Probing the server failed.
    #[error("probe failed during {stage}: {source}")]
    Connection {
        stage: ProbeStage,
        #[source]
        source: TransportError,
    },

    #[error("database index {requested} is out of range, must be 0 to {max}")]
    IndexOutOfRange { requested: i64, max: u32 },

    #[error("{operation} is invalid on key '{key}' of type {actual}")]
    TypeMismatch {
        key: String,
        actual: KeyType,
        operation: &'static str,
    },

    #[error("unsupported type '{key_type}' for key '{key}'")]
    UnsupportedType { key: String, key_type: KeyType },

    /// A listed key name is not valid UTF-8 and cannot be addressed.
    #[error("key name '{0}' is not valid UTF-8")]
    InvalidKeyName(String),

    /// More per-key failures than the scan tolerates.
    #[error("scan aborted after {failures} per-key failures: {source}")]
    ScanAborted {
        failures: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn connection(stage: ProbeStage) -> impl FnOnce(TransportError) -> Error {
        move |source| Error::Connection { stage, source }
    }
}
