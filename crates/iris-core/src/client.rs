//! The capability boundary to the remote reasoning service.
//!
//! No business logic lives here; the orchestrator drives these operations
//! and is tested against in-memory fakes of this trait.

use crate::artifact::Artifact;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Opaque identifier of a remote reasoning session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote-side reference to an uploaded artifact within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One reasoning invocation within a session. Owned by the orchestrator
/// for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub session: SessionId,
    pub run_id: String,
}

/// Lifecycle states the remote service reports for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// The agent reported the run as failed, with the remote reason when
    /// one was provided.
    Failed { reason: Option<String> },
    Expired,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed { .. } | RunStatus::Expired
        )
    }
}

/// Narrow interface over the remote reasoning service.
///
/// One production implementation (REST, in `iris-interaction`) and
/// in-memory fakes for tests.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Opens a fresh session. One session per detection event; sessions
    /// are never shared across requests.
    async fn create_session(&self) -> Result<SessionId>;

    /// Uploads the prepared artifact into the session.
    async fn attach_artifact(&self, session: &SessionId, artifact: &Artifact)
    -> Result<ArtifactRef>;

    /// Starts a reasoning run over the attached artifact.
    async fn start_run(
        &self,
        session: &SessionId,
        artifact: &ArtifactRef,
        agent_id: &str,
    ) -> Result<RunHandle>;

    /// Reports the current status of a run.
    async fn poll_run(&self, run: &RunHandle) -> Result<RunStatus>;

    /// Reads the analysis text. Valid only once the run is `Completed`.
    async fn read_result(&self, run: &RunHandle) -> Result<String>;

    /// Best-effort cancellation of an abandoned run. Implementations
    /// without a cancel endpoint keep the default no-op.
    async fn cancel_run(&self, _run: &RunHandle) -> Result<()> {
        Ok(())
    }

    /// Tears the session down. Idempotent: an already-gone remote
    /// resource is success, and callers never fail a request on this.
    async fn destroy_session(&self, session: &SessionId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed { reason: None }.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
    }
}
