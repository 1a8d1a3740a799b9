//! Error taxonomy shared across the PR hub.

use thiserror::Error;

/// The error kinds a worker or handler can observe, independent of which
/// crate raised them. Recovery behaviour (retry vs. fail-permanently vs.
/// fatal-at-startup) is keyed off the variant, not the call site.
#[derive(Error, Debug, Clone)]
pub enum HubError {
    #[error("webhook signature invalid")]
    SignatureInvalid,

    #[error("credential denied: {reason}")]
    CredentialDenied { reason: String },

    #[error("upstream transient failure: {reason}")]
    UpstreamTransient { reason: String },

    #[error("upstream permanent failure ({status}): {reason}")]
    UpstreamPermanent { status: u16, reason: String },

    #[error("generative model failure: {reason}")]
    ModelFailure { reason: String },

    #[error("not found: {reason}")]
    NotFound { reason: String },

    #[error("missing configuration: {var}")]
    ConfigMissing { var: String },

    #[error("chat delivery failure: {reason}")]
    ChatDeliveryFailure { reason: String },

    #[error("storage error: {reason}")]
    StorageError { reason: String },

    #[error("queue error: {reason}")]
    QueueError { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl HubError {
    /// Whether an operation that raised this error kind should be retried
    /// by the job queue's backoff machinery.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, HubError::UpstreamTransient { .. })
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        HubError::Internal {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Internal {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Internal {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Truncates an error message to the 500-char limit the data model places
/// on `PullRequest.summaryError`.
#[must_use]
pub fn truncate_error_message(message: &str) -> String {
    if message.len() <= 500 {
        message.to_string()
    } else {
        message.chars().take(500).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_invalid_display() {
        let err = HubError::SignatureInvalid;
        assert_eq!(err.to_string(), "webhook signature invalid");
    }

    #[test]
    fn upstream_transient_is_retryable() {
        let err = HubError::UpstreamTransient {
            reason: "timeout".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = HubError::NotFound {
            reason: "pr vanished".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn truncate_error_message_caps_length() {
        let long = "x".repeat(600);
        let truncated = truncate_error_message(&long);
        assert_eq!(truncated.len(), 500);
    }

    #[test]
    fn truncate_error_message_passes_short_through() {
        assert_eq!(truncate_error_message("short"), "short");
    }
}
