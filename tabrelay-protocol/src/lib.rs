//! tabrelay-protocol: Frame definitions shared by the native host and the extension
//!
//! This crate defines the frame vocabulary carried over the browser's
//! native messaging channel, and the length-prefixed JSON codec that
//! frames it.

pub mod codec;
pub mod frame;

// Re-export main types at crate root
pub use codec::{CodecError, FrameCodec, MAX_HOST_OUTBOUND_FRAME_SIZE, MAX_INBOUND_FRAME_SIZE};
pub use frame::{
    ErrorPayload, Frame, FrameType, ReplyBody, ReplyStatus, RequestId, ServerStartedPayload,
    ServerStoppedPayload, ToolCallPayload,
};
