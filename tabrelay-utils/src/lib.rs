//! tabrelay-utils: Shared utilities for tabrelay
//!
//! Error types, logging setup, and XDG path helpers used by the other
//! tabrelay crates.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{RelayError, Result};
pub use logging::{init_logging_with_config, LogConfig, LogOutput, LOG_ENV_VAR};
pub use paths::{config_dir, config_file, ensure_dir, log_dir, state_dir, status_file};
