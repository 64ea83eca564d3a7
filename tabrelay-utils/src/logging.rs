//! Logging infrastructure for tabrelay
//!
//! Provides unified logging setup using the tracing ecosystem. The native
//! host owns stdout as its channel to the browser, so it only ever logs
//! to a file.

use std::fs::File;
use std::path::PathBuf;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, RelayError, Result};

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "TABRELAY_LOG";

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr
    Stderr,
    /// Append to a log file
    File,
    /// Log to both stderr and file
    Both,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "tabrelay_server=debug,hyper=warn")
    pub filter: String,
    /// Include span events (enter/exit)
    pub span_events: bool,
    /// Include file/line in logs
    pub file_line: bool,
    /// Directory for the log file (defaults to [`paths::log_dir`])
    pub dir: Option<PathBuf>,
    /// Log file name (defaults to "tabrelay.log")
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
            dir: None,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Config for the native host process launched by the browser
    pub fn native_host() -> Self {
        Self {
            output: LogOutput::File,
            filter: std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| "info".into()),
            span_events: false,
            file_line: true,
            dir: None,
            file_name: Some("tabrelay-host.log".into()),
        }
    }

    /// Config for running by hand against a TCP peer, where stderr is free
    pub fn development() -> Self {
        Self {
            output: LogOutput::Both,
            filter: std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| "debug".into()),
            span_events: true,
            file_line: true,
            dir: None,
            file_name: Some("tabrelay-dev.log".into()),
        }
    }

    /// Override the filter unless the environment variable is set
    pub fn with_default_filter(mut self, filter: Option<&str>) -> Self {
        if std::env::var(LOG_ENV_VAR).is_err() {
            if let Some(filter) = filter {
                self.filter = filter.to_string();
            }
        }
        self
    }

    /// Full path of the log file this config writes to
    pub fn log_path(&self) -> PathBuf {
        let dir = self.dir.clone().unwrap_or_else(paths::log_dir);
        dir.join(self.file_name.as_deref().unwrap_or("tabrelay.log"))
    }
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| RelayError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let fmt_layer = if config.span_events {
        fmt_layer.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
    } else {
        fmt_layer
    };

    let fmt_layer = if config.file_line {
        fmt_layer.with_file(true).with_line_number(true)
    } else {
        fmt_layer.with_file(false).with_line_number(false)
    };

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| RelayError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let file = open_log_file(&config)?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| RelayError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::Both => {
            let file = open_log_file(&config)?;

            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .map_err(|e| RelayError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

/// Open the log file in append mode, creating its directory first
fn open_log_file(config: &LogConfig) -> Result<File> {
    let log_path = config.log_path();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RelayError::FileWrite {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| RelayError::FileWrite {
            path: log_path,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert!(!config.span_events);
        assert!(!config.file_line);
    }

    #[test]
    fn test_log_config_native_host_logs_to_file() {
        let config = LogConfig::native_host();
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.file_name, Some("tabrelay-host.log".into()));
        assert!(config.log_path().ends_with("tabrelay-host.log"));
    }

    #[test]
    fn test_log_config_native_host_env_filter() {
        let original = env::var(LOG_ENV_VAR).ok();

        env::set_var(LOG_ENV_VAR, "trace");
        assert_eq!(LogConfig::native_host().filter, "trace");

        env::remove_var(LOG_ENV_VAR);
        assert_eq!(LogConfig::native_host().filter, "info");

        if let Some(val) = original {
            env::set_var(LOG_ENV_VAR, val);
        }
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.output, LogOutput::Both);
        assert!(config.span_events);
        assert!(config.log_path().ends_with("tabrelay-dev.log"));
        assert!(config.file_line);
    }

    #[test]
    fn test_log_path_uses_custom_dir() {
        let config = LogConfig {
            dir: Some(PathBuf::from("/var/log/tabrelay")),
            file_name: Some("host.log".into()),
            ..LogConfig::default()
        };
        assert_eq!(config.log_path(), PathBuf::from("/var/log/tabrelay/host.log"));
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            output: LogOutput::File,
            dir: Some(dir.path().join("nested").join("log")),
            ..LogConfig::default()
        };

        open_log_file(&config).unwrap();
        assert!(config.log_path().exists());
    }

    #[test]
    fn test_open_log_file_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let config = LogConfig {
            dir: Some(blocker.join("log")),
            ..LogConfig::default()
        };
        assert!(matches!(
            open_log_file(&config),
            Err(RelayError::FileWrite { .. })
        ));
    }

    // The global subscriber can only be installed once per process, so
    // init_logging_with_config() itself is exercised by the binary, not here.
}
