//! RESP Protocol Implementation
//!
//! Client-side RESP2: command frames are serialized with
//! [`RespValue::command`], replies are decoded by the incremental
//! [`RespParser`].
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum, serialization and typed accessors
//! - `parser`: incremental parser for server replies
//!
//! ## Example
//!
//! ```
//! use kvscout::protocol::{parse_message, RespValue};
//!
//! let frame = RespValue::command(&["PING"]).serialize();
//! assert_eq!(frame, b"*1\r\n$4\r\nPING\r\n");
//!
//! let (reply, _) = parse_message(b"+PONG\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_str(), Some("PONG"));
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
