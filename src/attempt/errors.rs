use thiserror::Error;

use crate::schemas::exam::AttemptId;
use crate::services::ServiceError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("attempt {0} was not found")]
    NotFound(AttemptId),
    #[error("network error: {0}")]
    Network(String),
    #[error("attempt {attempt_id} cannot be taken: {reason}")]
    InvalidAttempt { attempt_id: AttemptId, reason: String },
    #[error("no failed submission is waiting for a retry")]
    RetryUnavailable,
}

impl AttemptError {
    /// Maps a failure of the initial attempt fetch.
    pub(crate) fn from_fetch(attempt_id: AttemptId, err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { .. } => Self::NotFound(attempt_id),
            ServiceError::InvalidPayload(reason) => Self::InvalidAttempt { attempt_id, reason },
            other => Self::from_submit(other),
        }
    }

    /// Submission failures are always surfaced as retryable network errors.
    pub(crate) fn from_submit(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(message) => Self::Network(message),
            other => Self::Network(other.to_string()),
        }
    }
}
