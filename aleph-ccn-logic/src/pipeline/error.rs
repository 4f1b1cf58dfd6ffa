use crate::storage::StorageError;
use thiserror::Error;

/// Why a message was permanently rejected. Stored next to the envelope
/// in `rejected_messages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
    InvalidFormat,
    InvalidSignature,
    InvalidContent,
    Oversized,
    Unauthorized,
    StorageUnavailable,
    RetryExhausted,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::InvalidFormat => "invalid_format",
            RejectCode::InvalidSignature => "invalid_signature",
            RejectCode::InvalidContent => "invalid_content",
            RejectCode::Oversized => "oversized",
            RejectCode::Unauthorized => "unauthorized",
            RejectCode::StorageUnavailable => "storage_unavailable",
            RejectCode::RetryExhausted => "retry_exhausted",
        }
    }
}

/// Every pipeline stage returns either success, a permanent rejection,
/// or a transient error that re-enters the queue with backoff.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{reason}")]
    Permanent { code: RejectCode, reason: String },
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn permanent(code: RejectCode, reason: impl Into<String>) -> Self {
        PipelineError::Permanent {
            code,
            reason: reason.into(),
        }
    }
}

impl From<sea_orm::DbErr> for PipelineError {
    fn from(err: sea_orm::DbErr) -> Self {
        PipelineError::Transient(err.into())
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        if err.is_permanent() {
            PipelineError::permanent(RejectCode::StorageUnavailable, err.to_string())
        } else {
            PipelineError::Transient(err.into())
        }
    }
}

/// `min(cap, base * 2^retries)`, shared by both pending queues.
pub fn backoff(
    retries: u32,
    base: std::time::Duration,
    cap: std::time::Duration,
) -> std::time::Duration {
    base.checked_mul(2u32.saturating_pow(retries))
        .map_or(cap, |delay| delay.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(5);
        let cap = Duration::from_secs(3600);

        assert_eq!(backoff(0, base, cap), Duration::from_secs(5));
        assert_eq!(backoff(1, base, cap), Duration::from_secs(10));
        assert_eq!(backoff(4, base, cap), Duration::from_secs(80));
        assert_eq!(backoff(30, base, cap), cap);
        // would overflow without the checked multiply
        assert_eq!(backoff(u32::MAX, base, cap), cap);
    }
}
