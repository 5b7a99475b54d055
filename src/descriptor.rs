//! Key Descriptors and Type-Checked Readers
//!
//! A [`KeyDescriptor`] is what a scan produces for every key: the name, the
//! type reported by `TYPE`, and optionally an absolute expiry and an
//! approximate last-access time. Descriptors are immutable.
//!
//! Each reader checks the recorded type before touching the server, so a
//! hash is never read with `LRANGE`:
//!
//! | type      | reader              | result                       |
//! |-----------|---------------------|------------------------------|
//! | string    | `read_string`       | `Option<String>`             |
//! | list      | `range_list`        | `Vec<String>`                |
//! | set       | `scan_set`          | `Vec<String>`                |
//! | zset      | `scan_sorted_set`   | `Vec<(f64, String)>`         |
//! | hash      | `scan_hash`         | `BTreeMap<String, String>`   |
//!
//! [`KeyDescriptor::read_contents`] picks the reader from the type.

use crate::database::Database;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Page size requested from HSCAN / SSCAN / ZSCAN.
pub const READER_PAGE_SIZE: usize = 10_000;

/// Key type as reported by the `TYPE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    List,
    Set,
    SortedSet,
    Hash,
    /// The key does not exist (it may have expired after being listed).
    None,
    /// Anything else the server reports, e.g. streams or module types.
    Unknown,
}

impl KeyType {
    /// Maps a `TYPE` reply to a key type, case-insensitively.
    pub fn from_wire(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::SortedSet,
            "hash" => KeyType::Hash,
            "none" => KeyType::None,
            _ => KeyType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::SortedSet => "zset",
            KeyType::Hash => "hash",
            KeyType::None => "none",
            KeyType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a key, as returned by [`KeyDescriptor::read_contents`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyContents {
    String(Option<String>),
    List(Vec<String>),
    Set(Vec<String>),
    SortedSet(Vec<(f64, String)>),
    Hash(BTreeMap<String, String>),
}

impl fmt::Display for KeyContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyContents::String(Some(value)) => write!(f, "{}", value),
            KeyContents::String(None) => write!(f, "(nil)"),
            KeyContents::List(items) | KeyContents::Set(items) => {
                write!(f, "{}", items.join(", "))
            }
            KeyContents::SortedSet(entries) => {
                for (i, (score, member)) in entries.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{} : {}", score, member)?;
                }
                Ok(())
            }
            KeyContents::Hash(fields) => {
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{} : {}", field, value)?;
                }
                Ok(())
            }
        }
    }
}

/// Metadata for one enumerated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    name: String,
    key_type: KeyType,
    expiry: Option<DateTime<Utc>>,
    last_accessed: Option<DateTime<Utc>>,
}

impl KeyDescriptor {
    pub fn new(
        name: impl Into<String>,
        key_type: KeyType,
        expiry: Option<DateTime<Utc>>,
        last_accessed: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            key_type,
            expiry,
            last_accessed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_name(self) -> String {
        self.name
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Absolute expiry, present only when requested and the key has a TTL.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Approximate last access, present only when requested and the key was idle.
    pub fn last_accessed(&self) -> Option<DateTime<Utc>> {
        self.last_accessed
    }

    fn expect_type(&self, expected: KeyType, operation: &'static str) -> Result<()> {
        if self.key_type == expected {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                key: self.name.clone(),
                actual: self.key_type,
                operation,
            })
        }
    }

    /// Reads up to `max_count` members of a sorted set, ordered by score.
    ///
    /// Members sharing a score are all kept, ordered by member. Entries
    /// without a member value are skipped but still count towards `max_count`.
    pub async fn scan_sorted_set(
        &self,
        db: &Database,
        pattern: &str,
        max_count: usize,
    ) -> Result<Vec<(f64, String)>> {
        self.expect_type(KeyType::SortedSet, "scan_sorted_set")?;

        let mut output = Vec::new();
        if max_count == 0 {
            return Ok(output);
        }

        let mut visited = 0;
        let mut cursor = 0;
        'pages: loop {
            let page = db
                .sorted_set_scan(&self.name, cursor, pattern, READER_PAGE_SIZE)
                .await?;
            let (done, next) = (page.is_last(), page.cursor);

            for (member, score) in page.items {
                if visited == max_count {
                    break 'pages;
                }
                visited += 1;
                if let Some(member) = member {
                    output.push((score, member));
                }
            }

            if done {
                break;
            }
            cursor = next;
        }

        output.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(output)
    }

    /// Reads up to `max_count` fields of a hash.
    pub async fn scan_hash(
        &self,
        db: &Database,
        pattern: &str,
        max_count: usize,
    ) -> Result<BTreeMap<String, String>> {
        self.expect_type(KeyType::Hash, "scan_hash")?;

        let mut output = BTreeMap::new();
        if max_count == 0 {
            return Ok(output);
        }

        let mut visited = 0;
        let mut cursor = 0;
        'pages: loop {
            let page = db
                .hash_scan(&self.name, cursor, pattern, READER_PAGE_SIZE)
                .await?;
            let (done, next) = (page.is_last(), page.cursor);

            for (field, value) in page.items {
                if visited == max_count {
                    break 'pages;
                }
                visited += 1;
                output.insert(field, value);
            }

            if done {
                break;
            }
            cursor = next;
        }

        Ok(output)
    }

    /// Reads list elements `start..=stop`. A negative `stop` reads to the end.
    pub async fn range_list(&self, db: &Database, start: i64, stop: i64) -> Result<Vec<String>> {
        if start < 0 {
            return Err(Error::InvalidArgument(format!(
                "start must be non-negative, got {}",
                start
            )));
        }
        self.expect_type(KeyType::List, "range_list")?;

        let stop = if stop < 0 {
            -1
        } else if start > stop {
            return Err(Error::InvalidArgument(format!(
                "start '{}' must not exceed stop '{}'",
                start, stop
            )));
        } else {
            stop
        };

        Ok(db.list_range(&self.name, start, stop).await?)
    }

    /// Reads up to `max_count` members of a set, in server order.
    pub async fn scan_set(&self, db: &Database, pattern: &str, max_count: usize) -> Result<Vec<String>> {
        self.expect_type(KeyType::Set, "scan_set")?;

        let mut output = Vec::new();
        if max_count == 0 {
            return Ok(output);
        }

        let mut cursor = 0;
        loop {
            let page = db
                .set_scan(&self.name, cursor, pattern, READER_PAGE_SIZE)
                .await?;
            let (done, next) = (page.is_last(), page.cursor);

            let room = max_count - output.len();
            output.extend(page.items.into_iter().take(room));

            if done || output.len() == max_count {
                break;
            }
            cursor = next;
        }

        Ok(output)
    }

    pub async fn read_string(&self, db: &Database) -> Result<Option<String>> {
        self.expect_type(KeyType::String, "read_string")?;
        Ok(db.string_get(&self.name).await?)
    }

    /// Reads the whole value with the reader matching the key's type.
    pub async fn read_contents(&self, db: &Database) -> Result<KeyContents> {
        match self.key_type {
            KeyType::String => Ok(KeyContents::String(self.read_string(db).await?)),
            KeyType::List => Ok(KeyContents::List(self.range_list(db, 0, -1).await?)),
            KeyType::Set => Ok(KeyContents::Set(self.scan_set(db, "*", usize::MAX).await?)),
            KeyType::SortedSet => Ok(KeyContents::SortedSet(
                self.scan_sorted_set(db, "*", usize::MAX).await?,
            )),
            KeyType::Hash => Ok(KeyContents::Hash(self.scan_hash(db, "*", usize::MAX).await?)),
            KeyType::None | KeyType::Unknown => Err(Error::UnsupportedType {
                key: self.name.clone(),
                key_type: self.key_type,
            }),
        }
    }
}

impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key_type)?;
        if let Some(accessed) = self.last_accessed {
            write!(
                f,
                " accessed '{}'",
                accessed.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }
        if let Some(expiry) = self.expiry {
            write!(
                f,
                " expiring '{}'",
                expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }
        Ok(())
    }
}
