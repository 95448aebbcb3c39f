//! Real-time WebSocket fan-out: the Connection Manager (G) and Message
//! Handler (H) (`spec.md` §4.7).

pub mod manager;
pub mod message;
pub mod session;

pub use manager::{ConnectionManager, ConnectionStats, SharedConnectionManager};
pub use message::{InboundMessage, OutboundMessage, ParseError, parse_inbound};
pub use session::{OutboundSender, Session};
