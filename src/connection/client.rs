//! TCP Transport
//!
//! [`RespConnection`] is one TCP connection to a server. Requests are
//! serialized through a mutex; every request is a full round trip:
//!
//! ```text
//! execute(db, args)
//!        │
//!        ▼
//!  lock connection state
//!        │
//!        ▼
//!  selected db == db? ──no──> SELECT db ──> remember db
//!        │ yes
//!        ▼
//!  write command frame, flush
//!        │
//!        ▼
//!  ┌─────────────────────────────┐
//!  │ parse buffered bytes        │◄──┐
//!  │ complete? ──no──> read more │───┘
//!  └──────────────┬──────────────┘
//!                 ▼
//!  error reply ──> TransportError::Server
//! ```
//!
//! ## Abandoned Requests
//!
//! A caller may drop the future (a timeout, a `select!`) after its command
//! went out. The reply is still on its way, so the next request reads and
//! discards it before sending its own command. A request dropped halfway
//! through writing, or any I/O or protocol error, leaves the stream in an
//! unknown position; the connection is then broken and every later request
//! fails with [`TransportError::Closed`].
//!
//! ## Buffer Management
//!
//! Replies accumulate in a `BytesMut` until the parser sees a complete
//! value; the consumed prefix is then split off. A SCAN page with 10,000
//! keys is a few hundred kilobytes, so the buffer grows on demand.

use crate::config::{Configuration, Endpoint};
use crate::protocol::{RespParser, RespValue};
use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Minimum free space to keep in the buffer before each read
const READ_RESERVE: usize = 4096;

/// Where the stream stands between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    /// A command frame may be partially written.
    Writing,
    /// A command was sent and its reply not yet read.
    Reply,
    Broken,
}

struct ConnectionState {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
    pending: Pending,
    /// Database the server-side session has selected; `None` while a SELECT
    /// is unanswered.
    selected_db: Option<u32>,
}

/// A single RESP2 connection over TCP.
pub struct RespConnection {
    endpoint: Endpoint,
    state: Mutex<ConnectionState>,
}

impl std::fmt::Debug for RespConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespConnection")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl RespConnection {
    /// Connects to `endpoint`, authenticates when a password is configured and
    /// selects the configured default database.
    pub async fn connect(endpoint: &Endpoint, config: &Configuration) -> TransportResult<Self> {
        let stream = TcpStream::connect(endpoint.address()).await?;
        stream.set_nodelay(true)?;
        debug!(endpoint = %endpoint, "Connected");

        let connection = Self {
            endpoint: endpoint.clone(),
            state: Mutex::new(ConnectionState {
                stream: BufWriter::new(stream),
                buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
                parser: RespParser::new(),
                pending: Pending::Idle,
                selected_db: Some(0),
            }),
        };

        {
            let mut state = connection.state.lock().await;
            if let Some(password) = config.password() {
                expect_ok(state.round_trip(&["AUTH", password]).await?, "AUTH")?;
                trace!(endpoint = %endpoint, "Authenticated");
            }
            state.select(config.default_database()).await?;
        }

        Ok(connection)
    }
}

#[async_trait]
impl Transport for RespConnection {
    async fn execute(&self, db: u32, args: &[&str]) -> TransportResult<RespValue> {
        let mut state = self.state.lock().await;
        state.select(db).await?;
        match state.round_trip(args).await? {
            RespValue::Error(message) => Err(TransportError::Server(message)),
            reply => Ok(reply),
        }
    }
}

impl ConnectionState {
    /// Switches the session to `db` unless it is already selected.
    ///
    /// A rejected SELECT leaves the previous selection in place.
    async fn select(&mut self, db: u32) -> TransportResult<()> {
        if self.selected_db == Some(db) {
            return Ok(());
        }
        let previous = self.selected_db.take();
        let index = db.to_string();
        match expect_ok(self.round_trip(&["SELECT", &index]).await?, "SELECT") {
            Ok(()) => {
                self.selected_db = Some(db);
                Ok(())
            }
            Err(e) => {
                self.selected_db = previous;
                Err(e)
            }
        }
    }

    async fn round_trip(&mut self, args: &[&str]) -> TransportResult<RespValue> {
        match self.pending {
            Pending::Idle => {}
            Pending::Reply => {
                let stale = self.read_reply().await?;
                debug!(reply = %stale, "Discarded reply to an abandoned request");
            }
            Pending::Writing | Pending::Broken => {
                if self.pending == Pending::Writing {
                    warn!("Request abandoned mid-write, connection is unusable");
                }
                self.pending = Pending::Broken;
                return Err(TransportError::Closed);
            }
        }

        let frame = RespValue::command(args).serialize();
        self.pending = Pending::Writing;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        self.pending = Pending::Reply;
        trace!(command = args.first().copied().unwrap_or(""), bytes = frame.len(), "Sent command");

        let reply = self.read_reply().await?;
        self.pending = Pending::Idle;
        Ok(reply)
    }

    /// Reads one complete reply. Any error breaks the connection.
    async fn read_reply(&mut self) -> TransportResult<RespValue> {
        loop {
            if !self.buffer.is_empty() {
                match self.parser.parse(&self.buffer) {
                    Ok(Some((reply, consumed))) => {
                        let _ = self.buffer.split_to(consumed);
                        return Ok(reply);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.pending = Pending::Broken;
                        return Err(e.into());
                    }
                }
            }
            if let Err(e) = self.read_more_data().await {
                self.pending = Pending::Broken;
                return Err(e);
            }
        }
    }

    async fn read_more_data(&mut self) -> TransportResult<()> {
        if self.buffer.capacity() - self.buffer.len() < READ_RESERVE {
            self.buffer.reserve(READ_RESERVE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        trace!(bytes = n, buffered = self.buffer.len(), "Read data");
        Ok(())
    }
}

fn expect_ok(reply: RespValue, command: &str) -> TransportResult<()> {
    match reply {
        RespValue::SimpleString(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
        RespValue::Error(message) => Err(TransportError::Server(message)),
        other => Err(TransportError::UnexpectedReply {
            command: command.to_string(),
            reply: other.to_string(),
        }),
    }
}
