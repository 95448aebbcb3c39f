//! HTTP + WebSocket driver adapter (`spec.md` §6, §4.7).

mod controller;
mod request;
mod response;
mod ws;

pub use controller::{AppState, create_router};
pub use request::*;
pub use response::*;
