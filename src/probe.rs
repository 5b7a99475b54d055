//! Server Instance and Capability Probe
//!
//! An [`Instance`] stands for one server described by a configuration
//! string. Nothing touches the network until something asks for server
//! facts; the first such request runs the probe, and every later request is
//! answered from the memoized [`ProbeResult`].
//!
//! ## Probe Sequence
//!
//! ```text
//!  ┌──────────┐  first access   ┌──────────┐   success   ┌──────────┐
//!  │ Unprobed │ ──────────────> │ Probing  │ ──────────> │  Probed  │
//!  └──────────┘                 └────┬─────┘             └──────────┘
//!        ▲                           │ failure
//!        └───────────────────────────┘
//!
//!  Probing:
//!    1. connect (admin, database 0)
//!    2. PING                      -> round trip
//!    3. INFO server               -> redis_version, features
//!    4. PING on 0, 1, 2, ...      -> last answering index, at most 127
//! ```
//!
//! Concurrent first callers share one probe run. A failed probe is not
//! memoized: the state drops back to `Unprobed` and the next caller probes
//! again.

use crate::clock::{Clock, SystemClock};
use crate::config::Configuration;
use crate::connection::{ConnectionFactory, Connector, TcpConnector};
use crate::database::{Database, IterationMode};
use crate::error::{Error, ProbeStage, Result};
use crate::features::{ServerFeatures, ServerVersion};
use crate::scanner::{KeyScanner, ScanOptions, ScanResult};
use crate::transport::Transport;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Highest database index the discovery loop will try.
pub const MAX_DATABASE_CEILING: u32 = 127;

/// Where an instance is in its probe lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Unprobed,
    Probing,
    Probed,
}

impl ProbeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProbeState::Probing,
            2 => ProbeState::Probed,
            _ => ProbeState::Unprobed,
        }
    }
}

/// Facts learned by a successful probe.
#[derive(Debug)]
pub struct ProbeResult {
    version: Option<String>,
    features: ServerFeatures,
    max_database: u32,
    ping: Duration,
    connection: Arc<dyn Transport>,
}

impl ProbeResult {
    /// The raw `redis_version` string, if the server reported one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn features(&self) -> ServerFeatures {
        self.features
    }

    /// Highest database index that answered, zero-based and inclusive.
    pub fn max_database(&self) -> u32 {
        self.max_database
    }

    /// Round trip of the probe's PING.
    pub fn ping(&self) -> Duration {
        self.ping
    }

    /// The admin connection the probe ran on.
    pub fn connection(&self) -> &Arc<dyn Transport> {
        &self.connection
    }
}

/// A lazily probed server.
pub struct Instance {
    config: Configuration,
    factory: ConnectionFactory,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    probe: OnceCell<ProbeResult>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("config", &self.config)
            .field("state", &self.probe_state())
            .finish_non_exhaustive()
    }
}

impl Instance {
    /// Parses `configuration` and creates an unprobed instance. No I/O.
    pub fn new(configuration: &str) -> Result<Self> {
        Ok(Self::from_config(Configuration::parse(configuration)?))
    }

    pub fn from_config(config: Configuration) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// Creates an instance that opens its probe connection through `connector`.
    pub fn with_connector(config: Configuration, connector: Arc<dyn Connector>) -> Self {
        let probe_config = config.clone().with_default_database(0);
        Self {
            factory: ConnectionFactory::new(probe_config, true, connector),
            config,
            clock: Arc::new(SystemClock),
            state: AtomicU8::new(ProbeState::Unprobed as u8),
            probe: OnceCell::new(),
        }
    }

    /// Replaces the clock used for expiry and last-accessed timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn probe_state(&self) -> ProbeState {
        ProbeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runs the probe once and returns its memoized result.
    pub async fn probe(&self) -> Result<&ProbeResult> {
        self.probe.get_or_try_init(|| self.run_probe()).await
    }

    /// Parsed server version; `None` when the server did not report one.
    pub async fn version(&self) -> Result<Option<ServerVersion>> {
        let probe = self.probe().await?;
        Ok(probe.version().and_then(ServerVersion::parse))
    }

    pub async fn features(&self) -> Result<ServerFeatures> {
        Ok(self.probe().await?.features())
    }

    pub async fn max_database(&self) -> Result<u32> {
        Ok(self.probe().await?.max_database())
    }

    /// Returns a handle to database `index`, probing first if needed.
    pub async fn database(&self, index: i64) -> Result<Database> {
        let probe = self.probe().await?;
        let max = probe.max_database();
        match u32::try_from(index) {
            Ok(db) if db <= max => Ok(Database::new(db, Arc::clone(probe.connection()))),
            _ => Err(Error::IndexOutOfRange {
                requested: index,
                max,
            }),
        }
    }

    /// Scans database `index` with the options given.
    ///
    /// Servers known to predate SCAN are enumerated with a single KEYS call.
    pub async fn scan_database(&self, index: i64, options: &ScanOptions) -> Result<ScanResult> {
        if options.max_count == 0 {
            return Ok(ScanResult::new());
        }

        let db = self.database(index).await?;
        let probe = self.probe().await?;
        let mode = if probe.version().is_some() && !probe.features().scan() {
            IterationMode::Keys
        } else {
            IterationMode::Scan
        };

        debug!(db = db.index(), ?mode, pattern = %options.pattern, max_count = options.max_count, "Scanning database");
        KeyScanner::new(db, Arc::clone(&self.clock))
            .with_mode(mode)
            .scan(options)
            .await
    }

    async fn run_probe(&self) -> Result<ProbeResult> {
        self.set_state(ProbeState::Probing);
        match self.probe_sequence().await {
            Ok(result) => {
                self.set_state(ProbeState::Probed);
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Probe failed");
                self.set_state(ProbeState::Unprobed);
                Err(e)
            }
        }
    }

    async fn probe_sequence(&self) -> Result<ProbeResult> {
        let connection = self
            .factory
            .connection()
            .await
            .map_err(Error::connection(ProbeStage::Connect))?;

        let ping = connection
            .ping(0)
            .await
            .map_err(Error::connection(ProbeStage::Ping))?;

        let info = connection
            .info("server")
            .await
            .map_err(Error::connection(ProbeStage::Info))?;
        let version = info.get("server", "redis_version").map(str::to_string);
        let features = ServerFeatures::from_version_str(version.as_deref());

        let max_database = discover_max_database(connection.as_ref()).await;

        info!(
            version = version.as_deref().unwrap_or("unknown"),
            max_database,
            ping_us = ping.as_micros() as u64,
            "Probed server"
        );

        Ok(ProbeResult {
            version,
            features,
            max_database,
            ping,
            connection,
        })
    }

    fn set_state(&self, state: ProbeState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Probes databases upward from 0 and returns the last one that answered.
///
/// Stops at the first failure or at [`MAX_DATABASE_CEILING`]. Returns 0 even
/// when database 0 itself does not answer.
async fn discover_max_database(transport: &dyn Transport) -> u32 {
    let mut last_good = 0;
    for db in 0..=MAX_DATABASE_CEILING {
        if !transport.check_database(db).await {
            break;
        }
        last_good = db;
    }
    last_good
}
