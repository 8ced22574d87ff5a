//! Failure taxonomy for the sync server client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RemoteSyncError>;

/// What a failed operation is worth doing again. The scheduler drops
/// `Permanent` failures to the dead-letter list instead of burning retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

#[derive(Debug, Error)]
pub enum RemoteSyncError {
    /// Transport-level failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Body could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Missing or malformed access token.
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteSyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Classify for the queue's retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Json(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
        }
    }

    /// Transport failures (timeouts included) count as "offline": callers
    /// fall back to the local path instead of surfacing the error.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = RemoteSyncError::api(401, "unauthorized");
        assert_eq!(err.retry_class(), ApiRetryClass::ReauthRequired);
    }

    #[test]
    fn server_errors_are_retryable_and_not_offline() {
        let err = RemoteSyncError::api(503, "unavailable");
        assert_eq!(err.retry_class(), ApiRetryClass::Retryable);
        assert!(!err.is_offline());
    }

    #[test]
    fn client_side_rejections_are_permanent() {
        assert_eq!(
            RemoteSyncError::api(422, "validation failed").retry_class(),
            ApiRetryClass::Permanent
        );
    }
}
