//! Database Handles and Key Iteration
//!
//! A [`Database`] is a cheap, cloneable view of the shared transport bound to
//! one logical database index. Handles are only handed out by
//! [`Instance::database`](crate::probe::Instance::database), which validates
//! the index against the probed maximum first.
//!
//! [`KeyIter`] walks the keyspace one SCAN page at a time so a scan never
//! holds more than one page of key names in memory:
//!
//! ```text
//! next_key() ──> buffered page non-empty? ──yes──> pop front
//!                      │ no
//!                      ▼
//!               cursor exhausted? ──yes──> None
//!                      │ no
//!                      ▼
//!               SCAN cursor MATCH p COUNT n ──> refill buffer, loop
//! ```

use crate::descriptor::KeyType;
use crate::transport::{ScanPage, Transport, TransportResult};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// How a [`KeyIter`] asks the server for keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationMode {
    /// Cursor-based `SCAN`, one page per round trip.
    Scan,
    /// One `KEYS` call; only for servers that predate SCAN.
    Keys,
}

/// The shared connection bound to one database index.
#[derive(Debug, Clone)]
pub struct Database {
    index: u32,
    transport: Arc<dyn Transport>,
}

impl Database {
    pub(crate) fn new(index: u32, transport: Arc<dyn Transport>) -> Self {
        Self { index, transport }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub async fn key_type(&self, key: &str) -> TransportResult<KeyType> {
        self.transport.key_type(self.index, key).await
    }

    pub async fn time_to_live(&self, key: &str) -> TransportResult<Option<Duration>> {
        self.transport.time_to_live(self.index, key).await
    }

    pub async fn idle_time(&self, key: &str) -> TransportResult<Option<u64>> {
        self.transport.idle_time(self.index, key).await
    }

    /// Lazily iterates the keys matching `pattern`.
    pub fn keys(&self, pattern: &str, page_size: usize, mode: IterationMode) -> KeyIter {
        KeyIter {
            db: self.clone(),
            pattern: pattern.to_string(),
            page_size,
            mode,
            buffered: VecDeque::new(),
            next_cursor: Some(0),
        }
    }

    pub async fn list_range(&self, key: &str, start: i64, stop: i64) -> TransportResult<Vec<String>> {
        self.transport.list_range(self.index, key, start, stop).await
    }

    pub async fn string_get(&self, key: &str) -> TransportResult<Option<String>> {
        self.transport.string_get(self.index, key).await
    }

    pub async fn hash_scan(
        &self,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<(String, String)>> {
        self.transport
            .hash_scan(self.index, key, cursor, pattern, count)
            .await
    }

    pub async fn set_scan(
        &self,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<String>> {
        self.transport
            .set_scan(self.index, key, cursor, pattern, count)
            .await
    }

    pub async fn sorted_set_scan(
        &self,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<(Option<String>, f64)>> {
        self.transport
            .sorted_set_scan(self.index, key, cursor, pattern, count)
            .await
    }
}

/// Pull-based iterator over the keys of one database.
///
/// Keys come out in server iteration order, as the raw bytes the server
/// sent. SCAN may return a key more than once; de-duplication is left to the
/// consumer.
#[derive(Debug)]
pub struct KeyIter {
    db: Database,
    pattern: String,
    page_size: usize,
    mode: IterationMode,
    buffered: VecDeque<Bytes>,
    /// `None` once the server reported the end of iteration.
    next_cursor: Option<u64>,
}

impl KeyIter {
    /// Returns the next key, fetching a new page when the buffer runs dry.
    pub async fn next_key(&mut self) -> TransportResult<Option<Bytes>> {
        loop {
            if let Some(key) = self.buffered.pop_front() {
                return Ok(Some(key));
            }

            let Some(cursor) = self.next_cursor else {
                return Ok(None);
            };

            match self.mode {
                IterationMode::Scan => {
                    let page = self
                        .db
                        .transport
                        .scan(self.db.index, cursor, &self.pattern, self.page_size)
                        .await?;
                    trace!(
                        db = self.db.index,
                        cursor,
                        next = page.cursor,
                        keys = page.items.len(),
                        "Fetched SCAN page"
                    );
                    self.next_cursor = (!page.is_last()).then_some(page.cursor);
                    self.buffered.extend(page.items);
                }
                IterationMode::Keys => {
                    let keys = self.db.transport.keys(self.db.index, &self.pattern).await?;
                    trace!(db = self.db.index, keys = keys.len(), "Fetched KEYS reply");
                    self.next_cursor = None;
                    self.buffered.extend(keys);
                }
            }
        }
    }
}
