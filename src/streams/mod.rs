//! Websocket session tracking and frame multiplexing (`spec.md` §4.4).

pub mod message;
pub mod multiplexer;
pub mod registry;
pub mod session;

pub use message::{ClientPayload, ServerPayload, StreamMessage};
pub use multiplexer::StreamMultiplexer;
pub use registry::StreamRegistry;
pub use session::StreamSession;
