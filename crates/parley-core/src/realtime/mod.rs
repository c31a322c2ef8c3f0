//! Real-time fan-out to live connections.
//!
//! `registry` owns the in-memory connection maps and the self-healing
//! broadcast primitives; `broadcaster` layers session-ownership
//! authorization on top and is the narrow interface callers use.

pub mod broadcaster;
pub mod registry;

pub use broadcaster::Broadcaster;
pub use registry::{ConnectionRegistry, ConnectionSink, SEND_TIMEOUT};
