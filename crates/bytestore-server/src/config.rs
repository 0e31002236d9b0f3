use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server settings. Every field has a default, so a config file only needs
/// the keys it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener for the management API (upload, info, delete, tokens).
    pub api_addr: SocketAddr,
    /// Listener for token downloads.
    pub public_addr: SocketAddr,
    /// Store root holding one directory per container.
    pub root: PathBuf,
    /// Maximum number of ids returned by the listing endpoints.
    pub list_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8079)),
            public_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            root: PathBuf::from("./containers"),
            list_limit: 300,
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
