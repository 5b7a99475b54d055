//! Connection Configuration
//!
//! A [`Configuration`] names the server endpoints to try, the credentials
//! and the database a fresh connection starts on. It can be built in code or
//! parsed from a configuration string:
//!
//! ```text
//! host[:port][,host[:port]...][,password=secret][,defaultDatabase=2][,allowAdmin=true]
//! ```
//!
//! Option keywords are case-insensitive. A configuration always holds at
//! least one endpoint; both constructors reject an empty list.

use crate::error::{Error, Result};
use crate::DEFAULT_PORT;
use std::fmt;

/// One server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port`, `[v6-host]` or `[v6-host]:port`.
    ///
    /// IPv6 literals must be bracketed; a bare host with more than one colon
    /// is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |what: &str| Error::Configuration(format!("{} in endpoint '{}'", what, s));

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '['"))?;
            let port = match after {
                "" => None,
                _ => Some(after.strip_prefix(':').ok_or_else(|| invalid("unexpected text after ']'"))?),
            };
            (host, port)
        } else {
            match s.split_once(':') {
                Some((_, port)) if port.contains(':') => {
                    return Err(invalid("IPv6 host must be bracketed"));
                }
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None => DEFAULT_PORT,
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self::new(host, port))
    }

    /// `host:port` form accepted by `TcpStream::connect`.
    pub fn address(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Everything needed to reach a server.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    endpoints: Vec<Endpoint>,
    password: Option<String>,
    default_database: u32,
    allow_admin: bool,
}

impl Configuration {
    /// Creates a configuration for the given endpoints.
    ///
    /// Fails with [`Error::Configuration`] when `endpoints` is empty.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Configuration(
                "no endpoints were supplied in the configuration".to_string(),
            ));
        }

        Ok(Self {
            endpoints,
            password: None,
            default_database: 0,
            allow_admin: false,
        })
    }

    /// Parses a configuration string such as `localhost:6379,password=secret`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut endpoints = Vec::new();
        let mut password = None;
        let mut default_database = 0;
        let mut allow_admin = false;

        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let Some((key, value)) = token.split_once('=') else {
                endpoints.push(Endpoint::parse(token)?);
                continue;
            };

            match key.trim().to_ascii_lowercase().as_str() {
                "password" => password = Some(value.to_string()).filter(|p| !p.is_empty()),
                "defaultdatabase" => {
                    default_database = value.trim().parse().map_err(|_| {
                        Error::Configuration(format!("invalid defaultDatabase '{}'", value))
                    })?;
                }
                "allowadmin" => {
                    allow_admin = parse_bool(value).ok_or_else(|| {
                        Error::Configuration(format!("invalid allowAdmin '{}'", value))
                    })?;
                }
                other => {
                    return Err(Error::Configuration(format!(
                        "unknown configuration option '{}'",
                        other
                    )))
                }
            }
        }

        let mut config = Self::new(endpoints)?;
        config.password = password;
        config.default_database = default_database;
        config.allow_admin = allow_admin;
        Ok(config)
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_default_database(mut self, db: u32) -> Self {
        self.default_database = db;
        self
    }

    pub fn with_allow_admin(mut self, allow_admin: bool) -> Self {
        self.allow_admin = allow_admin;
        self
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn default_database(&self) -> u32 {
        self.default_database
    }

    pub fn allow_admin(&self) -> bool {
        self.allow_admin
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("endpoints", &self.endpoints)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("default_database", &self.default_database)
            .field("allow_admin", &self.allow_admin)
            .finish()
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
