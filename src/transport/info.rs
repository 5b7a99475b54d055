//! Parsing of `INFO` replies.
//!
//! The server answers `INFO` with plain text grouped into sections:
//!
//! ```text
//! # Server
//! redis_version:7.2.4
//! redis_mode:standalone
//!
//! # Keyspace
//! db0:keys=12,expires=3,avg_ttl=0
//! ```
//!
//! Lines before the first header land in an unnamed section. Lookups by
//! section and key are case-insensitive.

/// One `# Name` group of an INFO reply, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl InfoSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    sections: Vec<InfoSection>,
}

impl ServerInfo {
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<InfoSection> = Vec::new();

        for line in text.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('#') {
                sections.push(InfoSection {
                    name: header.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };

            if sections.is_empty() {
                sections.push(InfoSection::default());
            }
            if let Some(section) = sections.last_mut() {
                section.entries.push((key.to_string(), value.to_string()));
            }
        }

        Self { sections }
    }

    pub fn sections(&self) -> &[InfoSection] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&InfoSection> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Looks up `key` inside `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }
}
