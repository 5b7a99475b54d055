//! Transport Abstraction
//!
//! Everything the probe and the scanner need from the server goes through
//! the [`Transport`] trait. Implementors provide a single primitive,
//! [`Transport::execute`], which runs one command against one logical
//! database and returns the raw reply. The typed operations are provided on
//! top of it and only decode replies:
//!
//! ```text
//! ┌──────────────┐   typed calls    ┌──────────────────────────────┐
//! │ Instance /   │ ───────────────> │ Transport (provided methods) │
//! │ KeyScanner / │                  │  ping, info, key_type, scan  │
//! │ descriptors  │                  └──────────────┬───────────────┘
//! └──────────────┘                                 │ execute(db, args)
//!                                                  ▼
//!                                  ┌──────────────────────────────┐
//!                                  │ RespConnection (TCP) or any  │
//!                                  │ in-memory implementation     │
//!                                  └──────────────────────────────┘
//! ```
//!
//! Server error replies become [`TransportError::Server`]; replies of the
//! wrong shape become [`TransportError::UnexpectedReply`].

pub mod info;

use crate::descriptor::KeyType;
use crate::protocol::{ParseError, RespValue};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

pub use info::{InfoSection, ServerInfo};

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("connection closed by server")]
    Closed,

    /// None of the configured endpoints accepted a connection.
    #[error("no endpoint could be reached: {0}")]
    Unreachable(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One page of a cursor-based scan. A cursor of 0 means iteration is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage<T> {
    pub cursor: u64,
    pub items: Vec<T>,
}

impl<T> ScanPage<T> {
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// A connection to a server that can address any of its logical databases.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Runs one command on database `db` and returns the raw reply.
    ///
    /// Error replies must be returned as `Err(TransportError::Server(_))`.
    async fn execute(&self, db: u32, args: &[&str]) -> TransportResult<RespValue>;

    /// Sends PING and measures the round trip.
    async fn ping(&self, db: u32) -> TransportResult<Duration> {
        let started = Instant::now();
        let reply = self.execute(db, &["PING"]).await?;
        if is_pong(&reply) {
            Ok(started.elapsed())
        } else {
            Err(unexpected("PING", &reply))
        }
    }

    /// Reports whether database `db` exists and answers.
    ///
    /// Any failure, including an error reply, is a `false` rather than an error.
    async fn check_database(&self, db: u32) -> bool {
        match self.execute(db, &["PING"]).await {
            Ok(reply) => is_pong(&reply),
            Err(e) => {
                debug!(db, error = %e, "Database liveness check failed");
                false
            }
        }
    }

    async fn info(&self, section: &str) -> TransportResult<ServerInfo> {
        let reply = self.execute(0, &["INFO", section]).await?;
        match reply.to_text() {
            Some(text) => Ok(ServerInfo::parse(&text)),
            None => Err(unexpected("INFO", &reply)),
        }
    }

    async fn key_type(&self, db: u32, key: &str) -> TransportResult<KeyType> {
        let reply = self.execute(db, &["TYPE", key]).await?;
        match reply.as_str() {
            Some(name) => Ok(KeyType::from_wire(name)),
            None => Err(unexpected("TYPE", &reply)),
        }
    }

    /// Remaining time to live, `None` for missing keys and keys without expiry.
    async fn time_to_live(&self, db: u32, key: &str) -> TransportResult<Option<Duration>> {
        let reply = self.execute(db, &["PTTL", key]).await?;
        match reply.as_integer() {
            Some(ms) if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
            // -1: no expiry, -2: no such key
            Some(_) => Ok(None),
            None => Err(unexpected("PTTL", &reply)),
        }
    }

    /// Seconds since the key was last touched, via `OBJECT IDLETIME`.
    async fn idle_time(&self, db: u32, key: &str) -> TransportResult<Option<u64>> {
        let reply = self.execute(db, &["OBJECT", "IDLETIME", key]).await?;
        if reply.is_null() {
            return Ok(None);
        }
        match reply.as_integer() {
            Some(secs) if secs >= 0 => Ok(Some(secs as u64)),
            _ => Err(unexpected("OBJECT IDLETIME", &reply)),
        }
    }

    async fn scan(
        &self,
        db: u32,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<Bytes>> {
        let cursor = cursor.to_string();
        let count = count.to_string();
        let reply = self
            .execute(db, &["SCAN", &cursor, "MATCH", pattern, "COUNT", &count])
            .await?;
        let (cursor, items) = split_scan_reply("SCAN", reply)?;
        Ok(ScanPage {
            cursor,
            items: raw_items("SCAN", items)?,
        })
    }

    /// Single-shot `KEYS pattern` for servers without SCAN.
    async fn keys(&self, db: u32, pattern: &str) -> TransportResult<Vec<Bytes>> {
        let reply = self.execute(db, &["KEYS", pattern]).await?;
        match reply.into_array() {
            Some(items) => raw_items("KEYS", items),
            None => Err(TransportError::UnexpectedReply {
                command: "KEYS".to_string(),
                reply: "non-array reply".to_string(),
            }),
        }
    }

    async fn hash_scan(
        &self,
        db: u32,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<(String, String)>> {
        let cursor = cursor.to_string();
        let count = count.to_string();
        let reply = self
            .execute(db, &["HSCAN", key, &cursor, "MATCH", pattern, "COUNT", &count])
            .await?;
        let (cursor, items) = split_scan_reply("HSCAN", reply)?;
        let flat = text_items("HSCAN", items)?;
        if flat.len() % 2 != 0 {
            return Err(TransportError::UnexpectedReply {
                command: "HSCAN".to_string(),
                reply: format!("odd number of field/value items ({})", flat.len()),
            });
        }
        let mut pairs = Vec::with_capacity(flat.len() / 2);
        let mut iter = flat.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((field, value));
        }
        Ok(ScanPage {
            cursor,
            items: pairs,
        })
    }

    async fn set_scan(
        &self,
        db: u32,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<String>> {
        let cursor = cursor.to_string();
        let count = count.to_string();
        let reply = self
            .execute(db, &["SSCAN", key, &cursor, "MATCH", pattern, "COUNT", &count])
            .await?;
        let (cursor, items) = split_scan_reply("SSCAN", reply)?;
        Ok(ScanPage {
            cursor,
            items: text_items("SSCAN", items)?,
        })
    }

    /// ZSCAN page as `(member, score)` pairs. Null members come back as `None`.
    async fn sorted_set_scan(
        &self,
        db: u32,
        key: &str,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> TransportResult<ScanPage<(Option<String>, f64)>> {
        let cursor = cursor.to_string();
        let count = count.to_string();
        let reply = self
            .execute(db, &["ZSCAN", key, &cursor, "MATCH", pattern, "COUNT", &count])
            .await?;
        let (cursor, items) = split_scan_reply("ZSCAN", reply)?;
        if items.len() % 2 != 0 {
            return Err(TransportError::UnexpectedReply {
                command: "ZSCAN".to_string(),
                reply: format!("odd number of member/score items ({})", items.len()),
            });
        }

        let mut entries = Vec::with_capacity(items.len() / 2);
        for pair in items.chunks(2) {
            let member = pair[0].to_text();
            let score = pair[1]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| unexpected("ZSCAN", &pair[1]))?;
            entries.push((member, score));
        }
        Ok(ScanPage {
            cursor,
            items: entries,
        })
    }

    /// `LRANGE key start stop`, both bounds inclusive.
    async fn list_range(
        &self,
        db: u32,
        key: &str,
        start: i64,
        stop: i64,
    ) -> TransportResult<Vec<String>> {
        let start = start.to_string();
        let stop = stop.to_string();
        let reply = self.execute(db, &["LRANGE", key, &start, &stop]).await?;
        match reply.into_array() {
            Some(items) => text_items("LRANGE", items),
            None => Err(TransportError::UnexpectedReply {
                command: "LRANGE".to_string(),
                reply: "non-array reply".to_string(),
            }),
        }
    }

    async fn string_get(&self, db: u32, key: &str) -> TransportResult<Option<String>> {
        let reply = self.execute(db, &["GET", key]).await?;
        if reply.is_null() {
            return Ok(None);
        }
        match reply.to_text() {
            Some(value) => Ok(Some(value)),
            None => Err(unexpected("GET", &reply)),
        }
    }
}

fn is_pong(reply: &RespValue) -> bool {
    reply
        .as_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("PONG"))
}

fn unexpected(command: &str, reply: &RespValue) -> TransportError {
    TransportError::UnexpectedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}

/// Splits a `[cursor, [items...]]` reply.
fn split_scan_reply(command: &str, reply: RespValue) -> TransportResult<(u64, Vec<RespValue>)> {
    let shape_error = |reply: &RespValue| unexpected(command, reply);

    let mut parts = match reply {
        RespValue::Array(parts) if parts.len() == 2 => parts,
        other => return Err(shape_error(&other)),
    };

    let items = match parts.pop() {
        Some(RespValue::Array(items)) => items,
        Some(other) => return Err(shape_error(&other)),
        None => Vec::new(),
    };
    let cursor = parts
        .first()
        .and_then(|c| c.as_str())
        .and_then(|c| c.parse::<u64>().ok());

    match (cursor, parts.first()) {
        (Some(cursor), _) => Ok((cursor, items)),
        (None, Some(bad)) => Err(shape_error(bad)),
        (None, None) => Err(shape_error(&RespValue::Null)),
    }
}

/// Key names exactly as the server sent them.
fn raw_items(command: &str, items: Vec<RespValue>) -> TransportResult<Vec<Bytes>> {
    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(name) => Ok(name),
            RespValue::SimpleString(name) => Ok(Bytes::from(name)),
            other => Err(unexpected(command, &other)),
        })
        .collect()
}

fn text_items(command: &str, items: Vec<RespValue>) -> TransportResult<Vec<String>> {
    items
        .iter()
        .map(|item| item.to_text().ok_or_else(|| unexpected(command, item)))
        .collect()
}
