//! Webhook receiver: HMAC signature verification, JSON parsing, and the
//! single per-action event dispatcher (§4.G), plus Installation Sync (§4.H).

pub mod handler;
pub mod installation_sync;
pub mod payload;
pub mod signature;

pub use handler::{build_router, AppState};
