//! Fault-Tolerant Keyspace Scanner
//!
//! [`KeyScanner`] enumerates the keys of one database and builds a
//! [`KeyDescriptor`] for each of them. Keys are processed strictly one at a
//! time: every metadata lookup is its own round trip, which keeps the load on
//! the server bounded at the price of scan latency.
//!
//! ## Per-key pipeline
//!
//! ```text
//!  key from SCAN page
//!        │
//!        ▼
//!  TYPE key ───────────────────────────────┐
//!        │                                 │
//!        ▼ (include_expiry)                │ any error
//!  PTTL key ──> expiry = now + ttl         │
//!        │                                 ▼
//!        ▼ (include_last_accessed)   failures += 1
//!  OBJECT IDLETIME ──> now - idle    failures > budget? ──yes──> abort
//!        │                                 │ no
//!        ▼                                 ▼
//!  insert descriptor                 skip key, keep going
//! ```
//!
//! `now` is read separately for every key, so keys handled late in a long
//! scan use a later time base than keys handled early.
//!
//! An aborted scan returns [`Error::ScanAborted`] and discards whatever had
//! been collected. Errors from the key iteration itself (a failed SCAN page)
//! are not per-key failures and end the scan immediately.

use crate::clock::Clock;
use crate::database::{Database, IterationMode};
use crate::descriptor::KeyDescriptor;
use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Keys requested per SCAN round trip.
pub const SCAN_PAGE_SIZE: usize = 10_000;

/// Per-key failures tolerated before a scan aborts.
pub const FAILURE_BUDGET: usize = 100;

/// Scan output keyed and ordered by key name.
pub type ScanResult = BTreeMap<String, KeyDescriptor>;

/// What to scan for and which metadata to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Glob pattern passed to `SCAN ... MATCH`.
    pub pattern: String,
    /// Stop once this many descriptors were collected.
    pub max_count: usize,
    pub include_expiry: bool,
    pub include_last_accessed: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            max_count: usize::MAX,
            include_expiry: false,
            include_last_accessed: false,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn include_expiry(mut self, include: bool) -> Self {
        self.include_expiry = include;
        self
    }

    pub fn include_last_accessed(mut self, include: bool) -> Self {
        self.include_last_accessed = include;
        self
    }
}

/// Scans one database handle.
#[derive(Debug, Clone)]
pub struct KeyScanner {
    db: Database,
    clock: Arc<dyn Clock>,
    mode: IterationMode,
    page_size: usize,
    failure_budget: usize,
}

impl KeyScanner {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            mode: IterationMode::Scan,
            page_size: SCAN_PAGE_SIZE,
            failure_budget: FAILURE_BUDGET,
        }
    }

    pub fn with_mode(mut self, mode: IterationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Runs the scan to the cap, to the end of the keyspace, or to the
    /// failure budget, whichever comes first.
    pub async fn scan(&self, options: &ScanOptions) -> Result<ScanResult> {
        let mut result = ScanResult::new();
        if options.max_count == 0 {
            return Ok(result);
        }

        let db = self.db.index();
        let mut keys = self.db.keys(&options.pattern, self.page_size, self.mode);
        let mut failures = 0;
        let mut unreadable: HashSet<Bytes> = HashSet::new();

        while let Some(raw) = keys.next_key().await? {
            // commands take text arguments, so only UTF-8 names can be addressed
            let key = match std::str::from_utf8(&raw) {
                Ok(key) => key,
                Err(_) => {
                    if unreadable.insert(raw.clone()) {
                        let name = String::from_utf8_lossy(&raw).into_owned();
                        self.tolerate(db, &name, Error::InvalidKeyName(name.clone()), &mut failures)?;
                    }
                    continue;
                }
            };

            if result.contains_key(key) {
                trace!(db, key, "Skipping repeated key");
                continue;
            }

            match self.describe(key, options).await {
                Ok(descriptor) => {
                    result.insert(key.to_string(), descriptor);
                    if result.len() >= options.max_count {
                        break;
                    }
                }
                Err(e) => self.tolerate(db, key, e, &mut failures)?,
            }
        }

        debug!(db, keys = result.len(), failures, pattern = %options.pattern, "Scan complete");
        Ok(result)
    }

    /// Counts a per-key failure, turning it into an abort once the budget is spent.
    fn tolerate(&self, db: u32, key: &str, error: Error, failures: &mut usize) -> Result<()> {
        *failures += 1;
        if *failures > self.failure_budget {
            warn!(db, key, error = %error, failures = *failures, "Failure budget exhausted, aborting scan");
            return Err(Error::ScanAborted {
                failures: *failures,
                source: Box::new(error),
            });
        }
        warn!(db, key, error = %error, failures = *failures, "Failed to load key details, skipping");
        Ok(())
    }

    async fn describe(&self, key: &str, options: &ScanOptions) -> Result<KeyDescriptor> {
        let key_type = self.db.key_type(key).await?;
        // one time base per key, shared by both timestamps
        let now = self.clock.now();

        let expiry = if options.include_expiry {
            match self.db.time_to_live(key).await? {
                Some(ttl) => shift(now, ttl, true),
                None => None,
            }
        } else {
            None
        };

        let last_accessed = if options.include_last_accessed {
            match self.db.idle_time(key).await? {
                Some(idle) if idle > 0 => shift(now, Duration::from_secs(idle), false),
                _ => None,
            }
        } else {
            None
        };

        trace!(key, key_type = %key_type, "Described key");
        Ok(KeyDescriptor::new(key, key_type, expiry, last_accessed))
    }
}

/// `now + by` or `now - by`; `None` when the result is not representable.
fn shift(now: DateTime<Utc>, by: Duration, forward: bool) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::from_std(by).ok()?;
    if forward {
        now.checked_add_signed(delta)
    } else {
        now.checked_sub_signed(delta)
    }
}
