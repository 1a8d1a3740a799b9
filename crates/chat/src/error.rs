//! Chat delivery has its own small error type rather than routing through
//! `HubError`: per §4.F/§9, delivery failures are always best-effort and
//! must never feed the queue's retry machinery, so the caller only ever
//! logs this and moves on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("chat delivery disabled or unconfigured")]
    NotConfigured,

    #[error("chat webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat webhook returned {status}: {body}")]
    NonSuccess { status: u16, body: String },

    #[error("failed to serialize chat payload: {0}")]
    Serialization(#[from] serde_json::Error),
}
