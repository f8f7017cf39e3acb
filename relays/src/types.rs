//! Core identity and record types for the monitor relay.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Header line written at the top of every audit log.
pub const AUDIT_HEADER: &str = "\"target\",\"chunk\",\"bytes\"";

/// Identity of a monitor process.
///
/// Selects the destination endpoint and audit log path out of configuration
/// and fixes the label stamped on every audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TargetId {
    One = 1,
    Two = 2,
}

impl TargetId {
    /// All identities a monitor process can run as.
    pub const ALL: [TargetId; 2] = [TargetId::One, TargetId::Two];

    /// Parse a command-line identity argument. Exact match only, no
    /// whitespace tolerance.
    pub fn from_arg(raw: &str) -> Result<Self, String> {
        match raw {
            "1" => Ok(TargetId::One),
            "2" => Ok(TargetId::Two),
            other => Err(format!("unknown monitor identity '{}', expected 1 or 2", other)),
        }
    }

    /// Zero-based index into the configuration tables.
    pub fn index(self) -> usize {
        self as usize - 1
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target_{}", *self as u8)
    }
}

impl TryFrom<u8> for TargetId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TargetId::One),
            2 => Ok(TargetId::Two),
            other => Err(format!("unknown monitor identity {}, expected 1 or 2", other)),
        }
    }
}

impl std::str::FromStr for TargetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_arg(s)
    }
}

/// Destination address for one monitor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One audit record describing a forwarded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    pub target: TargetId,
    pub sequence: u64,
    pub bytes: u64,
}

impl ChunkRecord {
    /// Render the record as one CSV line without trailing newline, e.g.
    /// `"target_1",5,1024`.
    pub fn to_csv_line(&self) -> String {
        format!("\"{}\",{},{}", self.target, self.sequence, self.bytes)
    }
}
