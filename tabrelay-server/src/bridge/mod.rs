//! Request/reply bridge over the native messaging channel
//!
//! - [`pending`]: the table of outstanding requests
//! - [`correlator`]: ids, timeouts, and reply matching
//! - [`transport`]: the channel itself
//! - [`session`]: the per-process owner of all of the above
//! - [`tool_bridge`]: `list_tools` / `call_tool` for the MCP endpoint

pub mod correlator;
pub mod error;
pub mod pending;
pub mod session;
pub mod tool_bridge;
pub mod transport;


pub use correlator::{Correlator, PendingReply};
pub use error::BridgeError;
pub use session::BridgeSession;
pub use tool_bridge::{ToolBridge, TOOL_REQUEST_TIMEOUT};
pub use transport::{ConnectionState, Endpoint, InboundFrames, TransportAdapter};
