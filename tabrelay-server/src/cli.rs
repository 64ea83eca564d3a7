//! Command-line argument parsing for the native host
//!
//! The browser launches the host with its own positional arguments (the
//! calling extension's origin, or a manifest path and extension id) and,
//! on Windows, `--parent-window=<handle>`. Those are accepted and logged;
//! everything else is for running the host by hand.

use clap::Parser;
use std::path::PathBuf;

use tabrelay_server::bridge::Endpoint;
use tabrelay_utils::LogConfig;

/// tabrelay - native messaging host for the tabrelay browser extension
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, short = 'c', env = "TABRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port for the MCP endpoint, overriding the configuration
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Print the persisted protocol server status and exit
    #[arg(long, default_value_t = false)]
    pub status: bool,

    /// Talk to the extension over TCP instead of stdio
    ///
    /// For development against a test peer.
    /// Example: --connect 127.0.0.1:9000
    #[arg(long, env = "TABRELAY_CONNECT")]
    pub connect: Option<String>,

    /// Native window handle of the calling browser (Windows only)
    #[arg(long = "parent-window")]
    pub parent_window: Option<String>,

    /// Arguments supplied by the browser on launch
    pub launch_args: Vec<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn endpoint(&self) -> Endpoint {
        match &self.connect {
            Some(addr) => Endpoint::Tcp(addr.clone()),
            None => Endpoint::Stdio,
        }
    }

    /// File-only logging under the browser; stderr as well with `--connect`
    pub fn log_config(&self) -> LogConfig {
        match self.endpoint() {
            Endpoint::Stdio => LogConfig::native_host(),
            Endpoint::Tcp(_) => LogConfig::development(),
        }
    }

    /// Origin of the calling extension, if the browser passed one
    pub fn origin(&self) -> Option<&str> {
        self.launch_args
            .iter()
            .map(String::as_str)
            .find(|arg| arg.contains("://"))
            .or_else(|| self.launch_args.last().map(String::as_str))
    }
}
