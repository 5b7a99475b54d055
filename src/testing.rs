//! In-memory doubles for the transport, connector and clock.
//!
//! [`FakeServer`] answers the subset of commands the scout sends, with keys
//! kept in insertion order so SCAN pages are deterministic. Cursors are plain
//! offsets into the filtered key list.

use crate::clock::Clock;
use crate::config::Configuration;
use crate::connection::Connector;
use crate::protocol::RespValue;
use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum FakeValue {
    String(String),
    List(Vec<String>),
    Set(Vec<String>),
    Hash(Vec<(String, String)>),
    SortedSet(Vec<(String, f64)>),
    Stream,
}

impl FakeValue {
    fn type_name(&self) -> &'static str {
        match self {
            FakeValue::String(_) => "string",
            FakeValue::List(_) => "list",
            FakeValue::Set(_) => "set",
            FakeValue::Hash(_) => "hash",
            FakeValue::SortedSet(_) => "zset",
            FakeValue::Stream => "stream",
        }
    }
}

/// A key stored in a [`FakeServer`].
#[derive(Debug, Clone)]
pub(crate) struct FakeKey {
    name: Bytes,
    value: FakeValue,
    ttl_ms: Option<u64>,
    idle_secs: Option<u64>,
    null_member: Option<String>,
}

impl FakeKey {
    fn new(name: &str, value: FakeValue) -> Self {
        Self::raw(name.as_bytes(), value)
    }

    fn raw(name: &[u8], value: FakeValue) -> Self {
        Self {
            name: Bytes::copy_from_slice(name),
            value,
            ttl_ms: None,
            idle_secs: Some(0),
            null_member: None,
        }
    }

    pub(crate) fn string(name: &str, value: &str) -> Self {
        Self::new(name, FakeValue::String(value.to_string()))
    }

    pub(crate) fn list(name: &str, items: &[&str]) -> Self {
        Self::new(name, FakeValue::List(owned(items)))
    }

    pub(crate) fn set(name: &str, members: &[&str]) -> Self {
        Self::new(name, FakeValue::Set(owned(members)))
    }

    pub(crate) fn hash(name: &str, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        Self::new(name, FakeValue::Hash(fields))
    }

    pub(crate) fn sorted_set(name: &str, members: &[(&str, f64)]) -> Self {
        let members = members.iter().map(|(m, s)| (m.to_string(), *s)).collect();
        Self::new(name, FakeValue::SortedSet(members))
    }

    pub(crate) fn stream(name: &str) -> Self {
        Self::new(name, FakeValue::Stream)
    }

    /// A string key whose name is arbitrary bytes.
    pub(crate) fn binary(name: &[u8], value: &str) -> Self {
        Self::raw(name, FakeValue::String(value.to_string()))
    }

    pub(crate) fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_ms = Some(secs * 1000);
        self
    }

    pub(crate) fn with_idle(mut self, secs: u64) -> Self {
        self.idle_secs = Some(secs);
        self
    }

    /// ZSCAN reports `member` as a null bulk string.
    pub(crate) fn with_null_member(mut self, member: &str) -> Self {
        self.null_member = Some(member.to_string());
        self
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Scripted server state behind a [`Transport`].
///
/// Databases `0..databases` answer; any command on a higher index fails the
/// way a rejected SELECT would.
#[derive(Debug)]
pub(crate) struct FakeServer {
    databases: u32,
    page_limit: usize,
    version: Mutex<Option<String>>,
    data: Mutex<BTreeMap<u32, Vec<FakeKey>>>,
    failing_commands: Mutex<HashSet<String>>,
    failing_keys: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl FakeServer {
    pub(crate) fn new(databases: u32) -> Self {
        Self {
            databases,
            page_limit: 1000,
            version: Mutex::new(Some("7.2.4".to_string())),
            data: Mutex::new(BTreeMap::new()),
            failing_commands: Mutex::new(HashSet::new()),
            failing_keys: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Caps the number of items any cursor page returns.
    pub(crate) fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Sets the reported `redis_version`; `None` leaves it out of INFO.
    pub(crate) fn with_version(self, version: Option<&str>) -> Self {
        *self.version.lock().unwrap() = version.map(str::to_string);
        self
    }

    /// Appends a key. Inserting a name twice makes SCAN report it twice.
    pub(crate) fn insert(&self, db: u32, key: FakeKey) {
        self.data.lock().unwrap().entry(db).or_default().push(key);
    }

    /// Every call of `command` fails with an error reply.
    pub(crate) fn fail_command(&self, command: &str) {
        self.failing_commands
            .lock()
            .unwrap()
            .insert(command.to_ascii_uppercase());
    }

    /// TYPE on `key` fails with an error reply.
    pub(crate) fn fail_key(&self, key: &str) {
        self.fail_command_for_key("TYPE", key);
    }

    pub(crate) fn fail_command_for_key(&self, command: &str, key: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .insert((command.to_ascii_uppercase(), key.to_string()));
    }

    pub(crate) fn count_of(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.eq_ignore_ascii_case(command))
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn find(&self, db: u32, name: &str) -> Option<FakeKey> {
        self.data
            .lock()
            .unwrap()
            .get(&db)
            .and_then(|keys| keys.iter().find(|k| k.name.as_ref() == name.as_bytes()).cloned())
    }

    fn names(&self, db: u32, pattern: &str) -> Vec<Bytes> {
        self.data
            .lock()
            .unwrap()
            .get(&db)
            .map(|keys| {
                keys.iter()
                    .filter(|k| glob_match(pattern, &String::from_utf8_lossy(&k.name)))
                    .map(|k| k.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Slices one cursor page out of `items`.
    fn page<T: Clone>(&self, items: &[T], cursor: &str) -> (String, Vec<T>) {
        let offset: usize = cursor.parse().unwrap_or(0);
        let end = (offset + self.page_limit).min(items.len());
        let page = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        let next = if end >= items.len() { 0 } else { end };
        (next.to_string(), page)
    }

    fn dispatch(&self, db: u32, args: &[String]) -> Result<RespValue, String> {
        let command = args[0].to_ascii_uppercase();
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        let pattern = match args.iter().position(|a| a.eq_ignore_ascii_case("MATCH")) {
            Some(i) => arg(i + 1),
            None => "*",
        };

        match command.as_str() {
            "PING" => Ok(RespValue::simple_string("PONG")),
            "INFO" => {
                let mut text = String::from("# Server\r\n");
                if let Some(version) = self.version.lock().unwrap().as_ref() {
                    text.push_str(&format!("redis_version:{}\r\n", version));
                }
                text.push_str("redis_mode:standalone\r\n");
                Ok(RespValue::bulk_string(text))
            }
            "SCAN" => {
                let (next, page) = self.page(&self.names(db, pattern), arg(1));
                Ok(scan_reply(next, page))
            }
            "KEYS" => Ok(RespValue::array(
                self.names(db, arg(1))
                    .into_iter()
                    .map(RespValue::bulk_string)
                    .collect(),
            )),
            "TYPE" => Ok(RespValue::simple_string(
                self.find(db, arg(1))
                    .map(|k| k.value.type_name())
                    .unwrap_or("none"),
            )),
            "PTTL" => Ok(RespValue::integer(match self.find(db, arg(1)) {
                Some(key) => key.ttl_ms.map(|ms| ms as i64).unwrap_or(-1),
                None => -2,
            })),
            "OBJECT" => match self.find(db, arg(2)).and_then(|k| k.idle_secs) {
                Some(secs) => Ok(RespValue::integer(secs as i64)),
                None => Ok(RespValue::null()),
            },
            "GET" => match self.find(db, arg(1)).map(|k| k.value) {
                Some(FakeValue::String(value)) => Ok(RespValue::bulk_string(value)),
                None => Ok(RespValue::null()),
                Some(_) => Err(wrong_type()),
            },
            "LRANGE" => match self.find(db, arg(1)).map(|k| k.value) {
                Some(FakeValue::List(items)) => {
                    let start: i64 = arg(2).parse().map_err(|_| "ERR value is not an integer".to_string())?;
                    let stop: i64 = arg(3).parse().map_err(|_| "ERR value is not an integer".to_string())?;
                    Ok(RespValue::array(
                        lrange(&items, start, stop)
                            .into_iter()
                            .map(RespValue::bulk_string)
                            .collect(),
                    ))
                }
                None => Ok(RespValue::array(Vec::new())),
                Some(_) => Err(wrong_type()),
            },
            "SSCAN" => match self.find(db, arg(1)).map(|k| k.value) {
                Some(FakeValue::Set(members)) => {
                    let members: Vec<_> = members.into_iter().filter(|m| glob_match(pattern, m)).collect();
                    let (next, page) = self.page(&members, arg(2));
                    Ok(scan_reply(next, page))
                }
                None => Ok(scan_reply("0".to_string(), Vec::<String>::new())),
                Some(_) => Err(wrong_type()),
            },
            "HSCAN" => match self.find(db, arg(1)).map(|k| k.value) {
                Some(FakeValue::Hash(fields)) => {
                    let fields: Vec<_> = fields.into_iter().filter(|(f, _)| glob_match(pattern, f)).collect();
                    let (next, page) = self.page(&fields, arg(2));
                    let flat = page.into_iter().flat_map(|(f, v)| [f, v]).collect();
                    Ok(scan_reply(next, flat))
                }
                None => Ok(scan_reply("0".to_string(), Vec::<String>::new())),
                Some(_) => Err(wrong_type()),
            },
            "ZSCAN" => match self.find(db, arg(1)) {
                Some(FakeKey {
                    value: FakeValue::SortedSet(members),
                    null_member,
                    ..
                }) => {
                    let members: Vec<_> = members.into_iter().filter(|(m, _)| glob_match(pattern, m)).collect();
                    let (next, page) = self.page(&members, arg(2));
                    let mut items = Vec::with_capacity(page.len() * 2);
                    for (member, score) in page {
                        if null_member.as_deref() == Some(member.as_str()) {
                            items.push(RespValue::null());
                        } else {
                            items.push(RespValue::bulk_string(member));
                        }
                        items.push(RespValue::bulk_string(score.to_string()));
                    }
                    Ok(RespValue::array(vec![
                        RespValue::bulk_string(next),
                        RespValue::array(items),
                    ]))
                }
                None => Ok(scan_reply("0".to_string(), Vec::<String>::new())),
                Some(_) => Err(wrong_type()),
            },
            other => Err(format!("ERR unknown command '{}'", other)),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn execute(&self, db: u32, args: &[&str]) -> TransportResult<RespValue> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let command = args.first().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(command.clone());

        if db >= self.databases {
            return Err(TransportError::Server("ERR DB index is out of range".to_string()));
        }
        if self.failing_commands.lock().unwrap().contains(&command) {
            return Err(TransportError::Server(format!("ERR injected {} failure", command)));
        }
        // the key is the last argument of TYPE, PTTL and OBJECT IDLETIME
        if let Some(key) = args.last() {
            if self
                .failing_keys
                .lock()
                .unwrap()
                .contains(&(command.clone(), key.clone()))
            {
                return Err(TransportError::Server(format!("ERR injected {} failure on {}", command, key)));
            }
        }

        self.dispatch(db, &args).map_err(TransportError::Server)
    }
}

fn scan_reply<T: Into<Bytes>>(cursor: String, items: Vec<T>) -> RespValue {
    RespValue::array(vec![
        RespValue::bulk_string(cursor),
        RespValue::array(items.into_iter().map(RespValue::bulk_string).collect()),
    ])
}

fn wrong_type() -> String {
    "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
}

fn lrange(items: &[String], start: i64, stop: i64) -> Vec<String> {
    let len = items.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    items[start as usize..=stop as usize].to_vec()
}

/// Glob matching with `*` and `?`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    fn go(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) => (0..=t.len()).any(|i| go(rest, &t[i..])),
            Some(('?', rest)) => !t.is_empty() && go(rest, &t[1..]),
            Some((c, rest)) => t.first() == Some(c) && go(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    go(&p, &t)
}

/// Hands out a shared [`FakeServer`] and counts connects.
#[derive(Debug)]
pub(crate) struct FakeConnector {
    server: Arc<FakeServer>,
    delay: Option<Duration>,
    remaining_failures: AtomicUsize,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new(server: Arc<FakeServer>) -> Self {
        Self {
            server,
            delay: None,
            remaining_failures: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        }
    }

    /// Each connect sleeps for `delay` first.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first `n` connects are refused.
    pub(crate) fn failing(self, n: usize) -> Self {
        self.remaining_failures.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _config: &Configuration) -> TransportResult<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let refused = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let transport: Arc<dyn Transport> = self.server.clone();
        Ok(transport)
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// A clock that moves forward by `step` every time it is read.
#[derive(Debug)]
pub(crate) struct SteppingClock {
    start: DateTime<Utc>,
    step: TimeDelta,
    reads: AtomicI32,
}

impl SteppingClock {
    pub(crate) fn new(start: DateTime<Utc>, step: TimeDelta) -> Self {
        Self {
            start,
            step,
            reads: AtomicI32::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        self.start + self.step * n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("user:*", "user:42"));
        assert!(glob_match("k?y", "key"));
        assert!(!glob_match("k?y", "kaay"));
        assert!(!glob_match("user:*", "session:1"));
        assert!(glob_match("*:1", "session:1"));
    }

    #[test]
    fn test_lrange_negative_indices() {
        let items = owned(&["a", "b", "c", "d"]);
        assert_eq!(lrange(&items, 0, -1), items);
        assert_eq!(lrange(&items, -2, -1), owned(&["c", "d"]));
        assert_eq!(lrange(&items, 3, 10), owned(&["d"]));
        assert!(lrange(&items, 5, -1).is_empty());
        assert!(lrange(&[], 0, -1).is_empty());
    }
}
