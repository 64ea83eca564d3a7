//! Configuration schema structs

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::transport::DEFAULT_OUTBOUND_QUEUE;
use crate::bridge::TOOL_REQUEST_TIMEOUT;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub mcp: McpConfig,
    pub status: StatusConfig,
    pub logging: LoggingConfig,
}

/// Channel and request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a request to the extension may wait (default: 30000)
    pub request_timeout_ms: u64,
    /// Frames that may queue for writing before senders wait (default: 64)
    pub outbound_queue: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: TOOL_REQUEST_TIMEOUT.as_millis() as u64,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// MCP HTTP endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub bind_address: String,
    /// Listen port; 0 picks an ephemeral port (default: 3025)
    pub port: u16,
    /// Start serving at launch instead of waiting for a `start` frame
    pub auto_start: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 3025,
            auto_start: false,
        }
    }
}

impl McpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.bind_address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Status file location (default: `$XDG_STATE_HOME/tabrelay/server-status.json`)
    pub path: Option<PathBuf>,
}

impl StatusConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(tabrelay_utils::status_file)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `TABRELAY_LOG` is unset
    pub filter: Option<String>,
}
