//! Error types for tabrelay
//!
//! Provides the error type shared by the tabrelay crates for everything
//! outside the request/response bridge itself.

use std::path::PathBuf;

/// Main error type for tabrelay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Protocol Server Errors ===

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    // === Channel Errors ===

    #[error("Channel error: {0}")]
    Channel(String),

    // === Persistence Errors ===

    #[error("Persistence error: {0}")]
    Persistence(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Bind { source, .. } => source.kind() == std::io::ErrorKind::AddrInUse,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = RelayError::FileRead {
            path: PathBuf::from("/etc/tabrelay/config.toml"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/etc/tabrelay/config.toml"));
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = RelayError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/tabrelay/config.toml"),
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn test_error_display_bind() {
        let err = RelayError::Bind {
            addr: "127.0.0.1:3025".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:3025"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(
            RelayError::config("bad port").to_string(),
            "Configuration error: bad port"
        );
        assert_eq!(
            RelayError::channel("stdin closed").to_string(),
            "Channel error: stdin closed"
        );
        assert_eq!(
            RelayError::persistence("disk full").to_string(),
            "Persistence error: disk full"
        );
        assert_eq!(
            RelayError::internal("invariant violated").to_string(),
            "Internal error: invariant violated"
        );
    }

    #[test]
    fn test_retryable() {
        let in_use = RelayError::Bind {
            addr: "127.0.0.1:3025".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(in_use.is_retryable());

        let denied = RelayError::Bind {
            addr: "127.0.0.1:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!denied.is_retryable());
        assert!(!RelayError::config("x").is_retryable());
        assert!(!RelayError::persistence("x").is_retryable());
    }

    #[test]
    fn test_from_io_error_preserves_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: RelayError = io_err.into();
        if let RelayError::Io(inner) = err {
            assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
        } else {
            panic!("Expected Io variant");
        }
    }
}
