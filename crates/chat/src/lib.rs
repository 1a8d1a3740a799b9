//! Chat notification payload builder and best-effort delivery channel.

pub mod blocks;
pub mod channel;
pub mod error;

pub use channel::ChatNotifier;
pub use error::ChatError;
