//! Bridge error types

use tabrelay_protocol::{CodecError, RequestId};

/// Failure of a correlated exchange or of the channel carrying it
///
/// `Clone` so that one disconnect can fail many pending exchanges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The channel could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Send attempted while no channel is open
    #[error("Not connected to the browser extension")]
    NotConnected,

    /// Open attempted while a channel is already open
    #[error("Already connected")]
    AlreadyConnected,

    /// The channel closed while the exchange was pending
    #[error("Channel closed before a reply arrived")]
    ChannelClosed,

    /// No reply within the request window
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    Timeout {
        request_id: RequestId,
        timeout_ms: u64,
    },

    /// The counterpart reported a failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// The reply payload was not a well-formed reply body
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The frame exceeds what the channel may carry; nothing was sent
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame could not be encoded; nothing was sent
    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl From<CodecError> for BridgeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MessageTooLarge { size, max } => Self::FrameTooLarge { size, max },
            other => Self::Encode(other.to_string()),
        }
    }
}

impl BridgeError {
    /// Whether this failure came from the channel rather than the request
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::NotConnected | Self::ChannelClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_frame_is_not_a_connection_error() {
        let err = BridgeError::from(CodecError::MessageTooLarge {
            size: 2_000_000,
            max: 1_048_576,
        });
        assert_eq!(
            err,
            BridgeError::FrameTooLarge {
                size: 2_000_000,
                max: 1_048_576
            }
        );
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_timeout_display() {
        let err = BridgeError::Timeout {
            request_id: RequestId::from("abc"),
            timeout_ms: 30000,
        };
        assert_eq!(err.to_string(), "Request abc timed out after 30000ms");
    }

    #[test]
    fn test_connection_errors() {
        assert!(BridgeError::ChannelClosed.is_connection_error());
        assert!(BridgeError::NotConnected.is_connection_error());
        assert!(BridgeError::ConnectionFailed("refused".into()).is_connection_error());
        assert!(!BridgeError::Remote("tab closed".into()).is_connection_error());
        assert!(!BridgeError::AlreadyConnected.is_connection_error());
    }
}
