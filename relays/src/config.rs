//! Monitor configuration loading and identity resolution.
//!
//! One TOML file declares the listen port plus the per-identity destination
//! targets and audit log paths:
//!
//! ```toml
//! listen_port = 9000
//!
//! [[targets]]
//! host = "127.0.0.1"
//! port = 9101
//!
//! [[audit_logs]]
//! file = "target_1_chunks.csv"
//! ```
//!
//! Identity `n` resolves `targets[n-1]` and `audit_logs[n-1]`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Endpoint, TargetId};

/// Errors produced while loading or resolving monitor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("configuration declares no destination targets")]
    NoTargets,

    #[error("configuration declares no audit logs")]
    NoAuditLogs,

    #[error("no destination target configured for {0}")]
    MissingDestination(TargetId),

    #[error("no audit log configured for {0}")]
    MissingLogPath(TargetId),
}

/// Audit log declaration for one monitor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogConfig {
    pub file: PathBuf,
}

/// Complete configuration for a monitor process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Port the relay listens on for inbound connections.
    pub listen_port: u16,
    /// Destination endpoints, indexed by monitor identity.
    pub targets: Vec<Endpoint>,
    /// Audit log files, indexed by monitor identity.
    pub audit_logs: Vec<AuditLogConfig>,
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Structural checks after parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.audit_logs.is_empty() {
            return Err(ConfigError::NoAuditLogs);
        }
        Ok(())
    }

    /// Destination endpoint for the given identity.
    pub fn destination_for(&self, target: TargetId) -> Result<&Endpoint, ConfigError> {
        self.targets
            .get(target.index())
            .ok_or(ConfigError::MissingDestination(target))
    }

    /// Audit log path for the given identity.
    pub fn log_path_for(&self, target: TargetId) -> Result<&Path, ConfigError> {
        self.audit_logs
            .get(target.index())
            .map(|log| log.file.as_path())
            .ok_or(ConfigError::MissingLogPath(target))
    }

    /// Loopback defaults for local development and tests.
    pub fn local_defaults() -> Self {
        Self {
            listen_port: 9000,
            targets: vec![
                Endpoint {
                    host: "127.0.0.1".to_string(),
                    port: 9101,
                },
                Endpoint {
                    host: "127.0.0.1".to_string(),
                    port: 9102,
                },
            ],
            audit_logs: vec![
                AuditLogConfig {
                    file: PathBuf::from("target_1_chunks.csv"),
                },
                AuditLogConfig {
                    file: PathBuf::from("target_2_chunks.csv"),
                },
            ],
        }
    }
}
