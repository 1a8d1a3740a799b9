//! Job processing outcome: distinguishes retryable from permanent failure
//! so the runner can decide whether to let the queue's backoff run or push
//! straight to the dead-letter zone (§4.E "Retry policy").

use prhub_core::HubError;

pub enum JobOutcome {
    Success,
    Retryable(HubError),
    Permanent(HubError),
}

impl JobOutcome {
    #[must_use]
    pub fn from_result(result: Result<(), HubError>) -> Self {
        match result {
            Ok(()) => JobOutcome::Success,
            Err(e) if e.is_retryable() => JobOutcome::Retryable(e),
            Err(e) => JobOutcome::Permanent(e),
        }
    }
}
