//! The reasoning orchestrator: drives one enrichment request through the
//! remote session lifecycle.
//!
//! The sequence `create -> attach -> start -> poll -> read -> destroy` is
//! modeled as an explicit [`Phase`] machine so the unconditional-cleanup
//! guarantee stays mechanically checkable: every created session is
//! destroyed on every exit path, including errors at any step.

use crate::artifact::Artifact;
use crate::client::{RunHandle, RunStatus, SessionClient, SessionId};
use crate::error::{EnrichError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Timing and retry policy for one reasoning run.
#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Identifier of the remote agent to invoke.
    pub agent_id: String,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Wall-clock deadline measured from run start.
    pub run_deadline: Duration,
    /// Total attempts for each remote setup step (create/attach/start).
    pub setup_attempts: u32,
    /// Initial backoff between setup retries; doubles per retry.
    pub retry_backoff: Duration,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            poll_interval: Duration::from_millis(1500),
            run_deadline: Duration::from_secs(60),
            setup_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Lifecycle of one enrichment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    SessionOpen,
    ArtifactAttached,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cleaned,
}

impl Phase {
    /// Legal transitions of the request lifecycle. Terminal phases only
    /// ever advance to `Cleaned`.
    pub fn allows(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Created, SessionOpen)
                | (SessionOpen, ArtifactAttached)
                | (SessionOpen, Failed)
                | (ArtifactAttached, Running)
                | (ArtifactAttached, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Completed, Cleaned)
                | (Failed, Cleaned)
                | (TimedOut, Cleaned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::TimedOut)
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    debug_assert!(phase.allows(next), "illegal transition {phase:?} -> {next:?}");
    trace!(from = ?phase, to = ?next, "phase transition");
    *phase = next;
}

/// Result of a completed reasoning run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub reasoning: String,
}

/// Drives one request end-to-end against a [`SessionClient`].
///
/// Stateless across requests; safe to share behind an `Arc` and call
/// concurrently.
pub struct ReasoningOrchestrator {
    client: Arc<dyn SessionClient>,
    policy: RunPolicy,
}

impl ReasoningOrchestrator {
    pub fn new(client: Arc<dyn SessionClient>, policy: RunPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// Runs one analysis. On success returns the agent's text; on failure
    /// a typed [`EnrichError`]. Either way, any session that was opened
    /// has been destroyed by the time this returns.
    pub async fn analyze(&self, artifact: Artifact) -> Result<Analysis> {
        let mut phase = Phase::Created;

        // Nothing to clean up if session creation itself fails.
        let session = self
            .with_retry("create_session", || self.client.create_session())
            .await?;
        advance(&mut phase, Phase::SessionOpen);
        debug!(session = %session, "session opened");

        let outcome = self.drive(&session, &artifact, &mut phase).await;

        if let Err(err) = self.client.destroy_session(&session).await {
            // Cleanup failures never decide the request outcome.
            warn!(session = %session, error = %err, "session cleanup failed");
        }
        advance(&mut phase, Phase::Cleaned);

        outcome
    }

    /// Everything between an open session and its teardown. Errors are
    /// mapped to their terminal phase here so `analyze` can destroy the
    /// session unconditionally afterwards.
    async fn drive(
        &self,
        session: &SessionId,
        artifact: &Artifact,
        phase: &mut Phase,
    ) -> Result<Analysis> {
        let outcome = self.execute(session, artifact, phase).await;
        if let Err(err) = &outcome {
            let terminal = if err.is_timeout() {
                Phase::TimedOut
            } else {
                Phase::Failed
            };
            advance(phase, terminal);
        }
        outcome
    }

    async fn execute(
        &self,
        session: &SessionId,
        artifact: &Artifact,
        phase: &mut Phase,
    ) -> Result<Analysis> {
        let artifact_ref = self
            .with_retry("attach_artifact", || {
                self.client.attach_artifact(session, artifact)
            })
            .await?;
        advance(phase, Phase::ArtifactAttached);

        let run = self
            .with_retry("start_run", || {
                self.client
                    .start_run(session, &artifact_ref, &self.policy.agent_id)
            })
            .await?;
        advance(phase, Phase::Running);
        debug!(session = %session, run_id = %run.run_id, "run started");

        let reasoning = self.poll_until_terminal(&run).await?;
        advance(phase, Phase::Completed);
        Ok(Analysis { reasoning })
    }

    /// Polls on a fixed interval until the run is terminal or the
    /// deadline elapses. The deadline is measured from run start.
    async fn poll_until_terminal(&self, run: &RunHandle) -> Result<String> {
        let deadline = Instant::now() + self.policy.run_deadline;

        loop {
            match self.client.poll_run(run).await? {
                RunStatus::Completed => return self.client.read_result(run).await,
                RunStatus::Failed { reason } => {
                    return Err(EnrichError::run_failure(
                        reason.unwrap_or_else(|| "remote agent reported failure".to_string()),
                    ));
                }
                RunStatus::Expired => {
                    return Err(EnrichError::run_failure("remote run expired"));
                }
                status => {
                    trace!(run_id = %run.run_id, ?status, "run not yet terminal");
                }
            }

            if Instant::now() >= deadline {
                // Best-effort cancel; an unsupported or failed cancel
                // leaves the run to expire server-side.
                if let Err(err) = self.client.cancel_run(run).await {
                    debug!(run_id = %run.run_id, error = %err, "run cancel failed");
                }
                return Err(EnrichError::RunTimeout {
                    deadline_ms: self.policy.run_deadline.as_millis() as u64,
                });
            }

            time::sleep(self.policy.poll_interval).await;
        }
    }

    /// Retries a remote setup step on retryable errors, up to the
    /// configured attempt budget. A server-provided `Retry-After` delay
    /// takes precedence over the exponential backoff.
    async fn with_retry<T, F, Fut>(&self, step: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.policy.retry_backoff;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.setup_attempts => {
                    let wait = err.retry_after().unwrap_or(backoff);
                    warn!(
                        step,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "setup step failed, retrying"
                    );
                    time::sleep(wait).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
