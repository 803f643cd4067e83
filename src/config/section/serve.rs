//! `[serve]` section configuration.
//!
//! Contains live preview server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 9877                 # WebSocket port; HTTP submission uses port + 1
//! home = "~/notes"            # Root for file-path requests and pipe directives
//! http = true                 # Enable the HTTP submission endpoint
//! ```
//!
//! `runtime_dir` defaults to `$XDG_RUNTIME_DIR/panlive` (or `/tmp/panlive`)
//! and holds the ingestion FIFO and the port marker.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Live preview server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    pub interface: IpAddr,

    /// WebSocket port number.
    pub port: u16,

    /// Home directory; document paths are reported relative to it.
    pub home: PathBuf,

    /// Directory for the ingestion FIFO and port marker.
    pub runtime_dir: Option<PathBuf>,

    /// Enable the HTTP submission endpoint on `port + 1`.
    pub http: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 9877,
            home: PathBuf::from("~"),
            runtime_dir: None,
            http: true,
        }
    }
}

impl ServeConfig {
    /// Port of the HTTP submission endpoint.
    pub fn http_port(&self) -> u16 {
        self.port.saturating_add(1)
    }

    /// Resolved runtime directory.
    pub fn runtime_dir(&self) -> PathBuf {
        if let Some(dir) = &self.runtime_dir {
            return dir.clone();
        }
        std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join("panlive")
    }

    /// Path of the ingestion FIFO.
    pub fn pipe_path(&self) -> PathBuf {
        self.runtime_dir().join("pipe")
    }
}
