//! Error types for the IRIS enrichment pipeline.

use std::time::Duration;
use thiserror::Error;

/// A shared error type for one enrichment request.
///
/// Every failure a request can hit is converted into one of these variants
/// at the orchestrator boundary; nothing escapes to crash the pipeline.
/// The `kind()` string is what downstream consumers see in the published
/// failure record.
#[derive(Error, Debug, Clone)]
pub enum EnrichError {
    /// The artifact could not be loaded, decoded, or re-encoded.
    /// Missing files, unsupported formats, and IO failures all land here.
    #[error("artifact preparation failed: {message}")]
    Preparation { message: String },

    /// The remote service refused to open a session.
    #[error("session creation failed: {message}")]
    SessionCreation {
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },

    /// The artifact upload into an open session failed.
    #[error("artifact upload failed: {message}")]
    Upload {
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },

    /// The reasoning run could not be started (unknown agent, quota, ...).
    #[error("run start failed: {message}")]
    RunStart {
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },

    /// The remote agent reported the run as failed or expired.
    #[error("reasoning run failed: {message}")]
    RunFailure { message: String },

    /// The run never reached a terminal status before the deadline.
    #[error("reasoning run exceeded deadline of {deadline_ms} ms")]
    RunTimeout { deadline_ms: u64 },

    /// Session teardown failed. Logged by the orchestrator, never
    /// surfaced as the request outcome.
    #[error("session cleanup failed: {message}")]
    Cleanup { message: String },
}

impl EnrichError {
    pub fn preparation(message: impl Into<String>) -> Self {
        Self::Preparation {
            message: message.into(),
        }
    }

    pub fn session_creation(message: impl Into<String>, retryable: bool) -> Self {
        Self::SessionCreation {
            message: message.into(),
            retryable,
            retry_after: None,
        }
    }

    pub fn upload(message: impl Into<String>, retryable: bool) -> Self {
        Self::Upload {
            message: message.into(),
            retryable,
            retry_after: None,
        }
    }

    pub fn run_start(message: impl Into<String>, retryable: bool) -> Self {
        Self::RunStart {
            message: message.into(),
            retryable,
            retry_after: None,
        }
    }

    /// Attaches a server-provided retry delay (`Retry-After`) to a setup
    /// error. A no-op on variants that are never retried.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        match &mut self {
            Self::SessionCreation { retry_after, .. }
            | Self::Upload { retry_after, .. }
            | Self::RunStart { retry_after, .. } => *retry_after = Some(delay),
            _ => {}
        }
        self
    }

    pub fn run_failure(message: impl Into<String>) -> Self {
        Self::RunFailure {
            message: message.into(),
        }
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::Cleanup {
            message: message.into(),
        }
    }

    /// Stable machine-readable name for this failure, published as
    /// `error_kind` on failure records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Preparation { .. } => "preparation_error",
            Self::SessionCreation { .. } => "session_creation_error",
            Self::Upload { .. } => "upload_error",
            Self::RunStart { .. } => "run_start_error",
            Self::RunFailure { .. } => "run_failure",
            Self::RunTimeout { .. } => "run_timeout",
            Self::Cleanup { .. } => "cleanup_error",
        }
    }

    /// Whether the orchestrator may retry the step that produced this error.
    /// Only remote setup steps are ever retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SessionCreation { retryable, .. }
            | Self::Upload { retryable, .. }
            | Self::RunStart { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Server-provided delay before the failed step may be retried, when
    /// the response carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::SessionCreation { retry_after, .. }
            | Self::Upload { retry_after, .. }
            | Self::RunStart { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RunTimeout { .. })
    }
}

impl From<std::io::Error> for EnrichError {
    fn from(err: std::io::Error) -> Self {
        Self::Preparation {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

/// A type alias for `Result<T, EnrichError>`.
pub type Result<T> = std::result::Result<T, EnrichError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(EnrichError::preparation("x").kind(), "preparation_error");
        assert_eq!(
            EnrichError::session_creation("x", true).kind(),
            "session_creation_error"
        );
        assert_eq!(EnrichError::upload("x", false).kind(), "upload_error");
        assert_eq!(EnrichError::run_start("x", false).kind(), "run_start_error");
        assert_eq!(EnrichError::run_failure("x").kind(), "run_failure");
        assert_eq!(
            EnrichError::RunTimeout { deadline_ms: 60_000 }.kind(),
            "run_timeout"
        );
        assert_eq!(EnrichError::cleanup("x").kind(), "cleanup_error");
    }

    #[test]
    fn retry_after_hint_rides_only_on_setup_errors() {
        let err = EnrichError::upload("throttled", true).with_retry_after(Duration::from_secs(3));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));

        assert_eq!(EnrichError::session_creation("x", true).retry_after(), None);
        assert_eq!(
            EnrichError::run_failure("x")
                .with_retry_after(Duration::from_secs(3))
                .retry_after(),
            None
        );
    }

    #[test]
    fn only_setup_errors_are_retryable() {
        assert!(EnrichError::session_creation("x", true).is_retryable());
        assert!(EnrichError::upload("x", true).is_retryable());
        assert!(EnrichError::run_start("x", true).is_retryable());
        assert!(!EnrichError::run_start("x", false).is_retryable());
        assert!(!EnrichError::run_failure("x").is_retryable());
        assert!(!EnrichError::RunTimeout { deadline_ms: 1 }.is_retryable());
        assert!(!EnrichError::preparation("x").is_retryable());
    }
}
