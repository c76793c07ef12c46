//! Errors surfaced by client construction and configuration.
//!
//! Runtime link and protocol failures are handled inside the transport and
//! never reach callers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while building a client.
///
/// Nothing at runtime is returned as an error: link failures reconnect on
/// their own and bad frames are logged and dropped.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
