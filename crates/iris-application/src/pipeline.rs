//! The enrichment pipeline: accepts detection events, runs each through
//! the reasoning orchestrator under a concurrency bound, and publishes
//! the outcome.
//!
//! Each accepted event yields exactly one logical outcome. Output order
//! is not tied to arrival order across concurrent requests.

use crate::transport::EventSink;
use iris_core::artifact;
use iris_core::client::SessionClient;
use iris_core::config::{FailurePolicy, ReasonerConfig};
use iris_core::error::EnrichError;
use iris_core::event::{DetectionEvent, EnrichedEvent};
use iris_core::orchestrator::{Analysis, ReasoningOrchestrator};
use iris_core::tracker::{MessageTracker, RequestTrace, TerminalState};
use iris_interaction::AgentServiceClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub struct EnrichmentPipeline {
    orchestrator: Arc<ReasoningOrchestrator>,
    sink: Arc<dyn EventSink>,
    tracker: Arc<MessageTracker>,
    limiter: Arc<Semaphore>,
    shutdown: CancellationToken,
    config: ReasonerConfig,
}

impl EnrichmentPipeline {
    pub fn new(
        client: Arc<dyn SessionClient>,
        sink: Arc<dyn EventSink>,
        config: ReasonerConfig,
    ) -> Self {
        Self {
            orchestrator: Arc::new(ReasoningOrchestrator::new(client, config.run_policy())),
            sink,
            tracker: Arc::new(MessageTracker::new()),
            limiter: Arc::new(Semaphore::new(config.concurrency_limit)),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Wires the pipeline to the production REST client, with credentials
    /// from the environment.
    pub fn with_remote_client(
        sink: Arc<dyn EventSink>,
        config: ReasonerConfig,
    ) -> iris_core::Result<Self> {
        let client = Arc::new(AgentServiceClient::try_from_env()?);
        Ok(Self::new(client, sink, config))
    }

    pub fn tracker(&self) -> Arc<MessageTracker> {
        self.tracker.clone()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); hosts can watch it
    /// to stop their intake loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops accepting new events. Requests already in flight finish
    /// normally.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Accepts one detection event.
    ///
    /// Waits for a concurrency permit (so excess events queue in arrival
    /// order at the caller), then processes the event on its own task.
    /// Per-request failures never escape this pipeline.
    pub async fn handle(&self, event: DetectionEvent) {
        if self.shutdown.is_cancelled() {
            warn!(image_path = %event.image_path, "pipeline shut down, event refused");
            return;
        }

        let permit = match self.limiter.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Semaphore closed only if the pipeline is being torn down.
                warn!(image_path = %event.image_path, "pipeline stopping, event refused");
                return;
            }
        };

        let trace = self.tracker.begin(&event.image_path);
        let orchestrator = self.orchestrator.clone();
        let sink = self.sink.clone();
        let tracker = self.tracker.clone();
        let config = self.config.clone();

        task::spawn(async move {
            let _permit = permit;
            process(orchestrator, sink, tracker, config, event, trace).await;
        });
    }
}

/// Runs one request to its terminal outcome and records it. Exactly one
/// of: enriched event published, failure record published, or failure
/// logged (preparation errors and the drop policy).
async fn process(
    orchestrator: Arc<ReasoningOrchestrator>,
    sink: Arc<dyn EventSink>,
    tracker: Arc<MessageTracker>,
    config: ReasonerConfig,
    event: DetectionEvent,
    trace: RequestTrace,
) {
    match enrich(&orchestrator, &event).await {
        Ok(analysis) => {
            let enriched = EnrichedEvent::success(
                event,
                &analysis.reasoning,
                &config.model_label,
                &config.agent_id,
                trace.correlation_id().to_string(),
            );
            publish(sink.as_ref(), &config.output_topic, &enriched).await;
            tracker.finish(&trace, TerminalState::Completed);
        }
        Err(err) => {
            let state = TerminalState::from(&err);
            match (&err, config.failure_policy) {
                (EnrichError::Preparation { .. }, _) => {
                    // Bad artifacts are dropped under either policy.
                    warn!(
                        correlation_id = %trace.correlation_id(),
                        image_path = %event.image_path,
                        error = %err,
                        "artifact unusable, request dropped"
                    );
                }
                (_, FailurePolicy::Drop) => {
                    warn!(
                        correlation_id = %trace.correlation_id(),
                        error = %err,
                        "enrichment failed, record dropped per policy"
                    );
                }
                (_, FailurePolicy::EmitError) => {
                    let record = EnrichedEvent::failure(
                        event,
                        &err,
                        &config.model_label,
                        &config.agent_id,
                        trace.correlation_id().to_string(),
                    );
                    publish(sink.as_ref(), &config.output_topic, &record).await;
                }
            }
            tracker.finish(&trace, state);
        }
    }
}

async fn enrich(
    orchestrator: &ReasoningOrchestrator,
    event: &DetectionEvent,
) -> iris_core::Result<Analysis> {
    let path = PathBuf::from(&event.image_path);
    // Image decode and re-encode are CPU-bound; keep them off the
    // async workers.
    let prepared = task::spawn_blocking(move || artifact::prepare(&path))
        .await
        .map_err(|err| EnrichError::preparation(format!("preparation task aborted: {err}")))??;
    orchestrator.analyze(prepared).await
}

async fn publish(sink: &dyn EventSink, topic: &str, event: &EnrichedEvent) {
    let payload = match serde_json::to_vec(event) {
        Ok(payload) => payload,
        Err(err) => {
            error!(correlation_id = %event.correlation_id, error = %err, "outcome not serializable");
            return;
        }
    };
    if let Err(err) = sink.publish(topic, payload).await {
        error!(correlation_id = %event.correlation_id, error = %err, "outbound publish failed");
    }
}
