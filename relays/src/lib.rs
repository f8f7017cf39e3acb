//! Tapline Monitor Relay Infrastructure
//!
//! Intercepting TCP relay between pipeline stages: forwards the byte stream
//! untouched and appends one CSV audit record per forwarded chunk.

pub mod audit;
pub mod config;
pub mod copier;
pub mod flow;
pub mod relay;
pub mod types;

pub use audit::*;
pub use config::*;
pub use copier::*;
pub use flow::*;
pub use relay::*;
pub use types::*;

use std::net::SocketAddr;
use std::path::PathBuf;

/// Relay-specific errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind listener on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize audit log {path}: {source}")]
    AuditInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;
