//! Server Version and Feature Detection
//!
//! The wire protocol has no capability query, so features are inferred from
//! the `redis_version` reported by `INFO server`. Version strings are parsed
//! leniently: `7.2.4`, `6.0`, `5.0.14-rc1` and `7` are all accepted, missing
//! components count as zero, and anything after the leading digits of a
//! component is ignored.

use std::fmt;

/// A `major.minor.patch` server version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a version string, returning `None` when it has no leading number.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.').map(leading_number);
        let major = parts.next().flatten()?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits = part.chars().take_while(|c| c.is_ascii_digit()).count();
    part[..digits].parse().ok()
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Commands and behaviours available on the probed server.
///
/// An unknown version yields the most conservative answers (version 0.0.0).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerFeatures {
    version: ServerVersion,
}

impl ServerFeatures {
    pub fn new(version: ServerVersion) -> Self {
        Self { version }
    }

    /// Features for a raw version string; unparseable strings count as unknown.
    pub fn from_version_str(version: Option<&str>) -> Self {
        Self::new(version.and_then(ServerVersion::parse).unwrap_or_default())
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        self.version >= ServerVersion::new(major, minor, patch)
    }

    /// `SCAN`, `HSCAN`, `SSCAN`, `ZSCAN`.
    pub fn scan(&self) -> bool {
        self.at_least(2, 8, 0)
    }

    /// `OBJECT IDLETIME`.
    pub fn object_idletime(&self) -> bool {
        self.at_least(2, 2, 3)
    }

    pub fn unlink(&self) -> bool {
        self.at_least(4, 0, 0)
    }

    pub fn memory_command(&self) -> bool {
        self.at_least(4, 0, 0)
    }

    pub fn streams(&self) -> bool {
        self.at_least(5, 0, 0)
    }

    pub fn acl(&self) -> bool {
        self.at_least(6, 0, 0)
    }

    pub fn functions(&self) -> bool {
        self.at_least(7, 0, 0)
    }
}
