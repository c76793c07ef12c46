//! Client configuration
//!
//! Loaded from `config.toml` in the data directory when present; every
//! field has a default so an empty or missing file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::reconnect::ReconnectPolicy;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_WS_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the chat server, e.g. `https://chat.example.com`.
    pub server_url: String,
    /// Fixed socket path on that origin.
    pub ws_path: String,
    /// Attach a per-process session id to user input.
    pub session_scoped: bool,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            session_scoped: false,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ClientError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&raw).map_err(|source| ClientError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Socket URL for this config's server.
    pub fn ws_url(&self) -> Result<String, ClientError> {
        ws_url(&self.server_url, &self.ws_path)
    }
}

/// Map a page/server origin to its socket URL.
///
/// The socket scheme mirrors the origin's (`https` → `wss`, `http` → `ws`);
/// host and port are kept and the path is replaced by `path`.
pub fn ws_url(base: &str, path: &str) -> Result<String, ClientError> {
    let base = base.trim();
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ClientError::InvalidUrl(base.to_string()))?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if authority.is_empty() {
        return Err(ClientError::InvalidUrl(base.to_string()));
    }

    let path = path.trim();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    Ok(format!("{ws_scheme}://{authority}{path}"))
}
