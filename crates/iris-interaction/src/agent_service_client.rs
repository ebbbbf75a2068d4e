//! AgentServiceClient - REST implementation of the session boundary.
//!
//! Talks to an agent-service project endpoint (thread/run API): threads
//! are reasoning sessions, messages carry the image payload, runs are
//! asynchronous agent invocations. Credentials come from the environment;
//! credential refresh and endpoint resolution are the host's concern.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use iris_core::artifact::Artifact;
use iris_core::client::{ArtifactRef, RunHandle, RunStatus, SessionClient, SessionId};
use iris_core::error::{EnrichError, Result};
use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Prompt sent with every artifact. The agent inspects one packed box
/// per image and reports misplaced, missing, misaligned, or damaged
/// items, with severity and location, in plain text.
const INSPECTION_PROMPT: &str = "You are a visual quality inspection agent for a \
production packing line. Each image shows the contents of one packed box. \
Describe in clear text any visual problems you observe: items that are \
misplaced, missing, folded incorrectly, misaligned, overlapping, or damaged, \
and any label, tape, or corner issues. For each defect give its severity \
(minor, moderate, severe) and its location in the image, then an overall \
pass/fail assessment. If the box appears perfect, state that no visual \
defects were detected.";

/// Remote setup step, used to pick the error variant for a failure.
#[derive(Clone, Copy)]
enum SetupStep {
    CreateSession,
    Upload,
    StartRun,
}

impl SetupStep {
    fn to_error(
        self,
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    ) -> EnrichError {
        let err = match self {
            SetupStep::CreateSession => EnrichError::session_creation(message, retryable),
            SetupStep::Upload => EnrichError::upload(message, retryable),
            SetupStep::StartRun => EnrichError::run_start(message, retryable),
        };
        match retry_after {
            Some(delay) => err.with_retry_after(delay),
            None => err,
        }
    }
}

/// [`SessionClient`] over the agent-service REST API.
#[derive(Clone)]
pub struct AgentServiceClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl AgentServiceClient {
    /// Creates a client for the given project endpoint and API key.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Loads endpoint and API key from `IRIS_ENDPOINT` / `IRIS_API_KEY`.
    pub fn try_from_env() -> Result<Self> {
        let endpoint = env::var("IRIS_ENDPOINT").map_err(|_| {
            EnrichError::session_creation("IRIS_ENDPOINT not set in environment", false)
        })?;
        let api_key = env::var("IRIS_API_KEY").map_err(|_| {
            EnrichError::session_creation("IRIS_API_KEY not set in environment", false)
        })?;
        Ok(Self::new(endpoint, api_key))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        step: SetupStep,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                step.to_error(
                    format!("agent service request failed: {err}"),
                    err.is_connect() || err.is_timeout(),
                    None,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(step.to_error(
                error_message(status, &body_text),
                is_retryable(status),
                retry_after,
            ));
        }

        response
            .json()
            .await
            .map_err(|err| step.to_error(format!("failed to parse response: {err}"), false, None))
    }

    async fn get_json<R: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<R> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| EnrichError::run_failure(format!("agent service poll failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(EnrichError::run_failure(error_message(status, &body_text)));
        }

        response
            .json()
            .await
            .map_err(|err| EnrichError::run_failure(format!("failed to parse response: {err}")))
    }
}

#[async_trait]
impl SessionClient for AgentServiceClient {
    async fn create_session(&self) -> Result<SessionId> {
        let thread: ThreadResponse = self
            .post_json(SetupStep::CreateSession, "threads", &serde_json::json!({}))
            .await?;
        debug!(thread_id = %thread.id, "created thread");
        Ok(SessionId(thread.id))
    }

    async fn attach_artifact(
        &self,
        session: &SessionId,
        artifact: &Artifact,
    ) -> Result<ArtifactRef> {
        let request = MessageRequest {
            role: "user",
            content: vec![
                ContentBlock::Text {
                    text: INSPECTION_PROMPT.to_string(),
                },
                ContentBlock::ImageUrl {
                    image_url: ImageUrl {
                        url: to_data_url(artifact),
                        detail: "high",
                    },
                },
            ],
        };
        let message: MessageResponse = self
            .post_json(
                SetupStep::Upload,
                &format!("threads/{}/messages", session.as_str()),
                &request,
            )
            .await?;
        debug!(
            thread_id = %session,
            message_id = %message.id,
            bytes = artifact.byte_len(),
            "attached artifact"
        );
        Ok(ArtifactRef(message.id))
    }

    async fn start_run(
        &self,
        session: &SessionId,
        _artifact: &ArtifactRef,
        agent_id: &str,
    ) -> Result<RunHandle> {
        let run: RunResponse = self
            .post_json(
                SetupStep::StartRun,
                &format!("threads/{}/runs", session.as_str()),
                &RunRequest { agent_id },
            )
            .await?;
        Ok(RunHandle {
            session: session.clone(),
            run_id: run.id,
        })
    }

    async fn poll_run(&self, run: &RunHandle) -> Result<RunStatus> {
        let state: RunStateResponse = self
            .get_json(&format!(
                "threads/{}/runs/{}",
                run.session.as_str(),
                run.run_id
            ))
            .await?;
        Ok(map_status(
            &state.status,
            state.last_error.map(|e| e.message),
        ))
    }

    async fn read_result(&self, run: &RunHandle) -> Result<String> {
        let messages: MessageListResponse = self
            .get_json(&format!(
                "threads/{}/messages?order=desc",
                run.session.as_str()
            ))
            .await?;

        extract_analysis_text(messages)
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!(
                "threads/{}/runs/{}/cancel",
                run.session.as_str(),
                run.run_id
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| EnrichError::cleanup(format!("run cancel failed: {err}")))?;

        if !response.status().is_success() {
            return Err(EnrichError::cleanup(format!(
                "run cancel rejected: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn destroy_session(&self, session: &SessionId) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("threads/{}", session.as_str())))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| EnrichError::cleanup(format!("thread delete failed: {err}")))?;

        let status = response.status();
        // An already-gone thread is success: teardown is idempotent.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(thread_id = %session, "destroyed thread");
            return Ok(());
        }

        warn!(thread_id = %session, %status, "thread delete rejected");
        Err(EnrichError::cleanup(format!(
            "thread delete rejected: HTTP {status}"
        )))
    }
}

fn to_data_url(artifact: &Artifact) -> String {
    format!(
        "data:{};base64,{}",
        artifact.mime_type(),
        BASE64_STANDARD.encode(artifact.bytes())
    )
}

fn map_status(status: &str, last_error: Option<String>) -> RunStatus {
    match status {
        "queued" => RunStatus::Queued,
        "in_progress" | "requires_action" => RunStatus::InProgress,
        "completed" => RunStatus::Completed,
        "expired" => RunStatus::Expired,
        "failed" | "cancelled" => RunStatus::Failed { reason: last_error },
        other => RunStatus::Failed {
            reason: Some(format!("unknown run status: {other}")),
        },
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn extract_analysis_text(messages: MessageListResponse) -> Result<String> {
    messages
        .data
        .into_iter()
        .filter(|message| message.role == "assistant")
        .flat_map(|message| message.content)
        .find_map(|block| match block {
            MessageContent::Text { text } => Some(text.value),
            MessageContent::Other => None,
        })
        .ok_or_else(|| EnrichError::run_failure("agent returned no analysis text"))
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Retry-After HTTP-date parsing is omitted for simplicity
    None
}

fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());
    format!("HTTP {status}: {detail}")
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ThreadResponse {
    id: String,
}

#[derive(Serialize)]
struct MessageRequest {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    agent_id: &'a str,
}

#[derive(Deserialize)]
struct RunResponse {
    id: String,
}

#[derive(Deserialize)]
struct RunStateResponse {
    status: String,
    #[serde(default)]
    last_error: Option<LastError>,
}

#[derive(Deserialize)]
struct LastError {
    message: String,
}

#[derive(Deserialize)]
struct MessageListResponse {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextBody },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextBody {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_remote_vocabulary() {
        assert_eq!(map_status("queued", None), RunStatus::Queued);
        assert_eq!(map_status("in_progress", None), RunStatus::InProgress);
        assert_eq!(map_status("requires_action", None), RunStatus::InProgress);
        assert_eq!(map_status("completed", None), RunStatus::Completed);
        assert_eq!(map_status("expired", None), RunStatus::Expired);
        assert_eq!(
            map_status("failed", Some("bad run".to_string())),
            RunStatus::Failed {
                reason: Some("bad run".to_string())
            }
        );
        assert!(matches!(
            map_status("something_new", None),
            RunStatus::Failed { reason: Some(_) }
        ));
    }

    #[test]
    fn retryable_status_classification() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn error_message_prefers_structured_detail() {
        let body = r#"{"error":{"type":"invalid_request","message":"agent missing"}}"#;
        let message = error_message(StatusCode::BAD_REQUEST, body);
        assert!(message.contains("agent missing"));
        assert!(message.contains("400"));

        let plain = error_message(StatusCode::BAD_GATEWAY, "upstream hiccup");
        assert!(plain.contains("upstream hiccup"));
    }

    #[test]
    fn data_url_carries_mime_and_base64_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();
        let artifact = iris_core::artifact::prepare(&path).unwrap();

        let url = to_data_url(&artifact);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let payload = url.trim_start_matches("data:image/jpeg;base64,");
        assert_eq!(
            BASE64_STANDARD.decode(payload).unwrap(),
            artifact.bytes()
        );
    }

    #[test]
    fn setup_steps_pick_their_error_variant() {
        assert_eq!(
            SetupStep::CreateSession
                .to_error("x".into(), true, None)
                .kind(),
            "session_creation_error"
        );
        assert_eq!(
            SetupStep::Upload.to_error("x".into(), false, None).kind(),
            "upload_error"
        );
        assert_eq!(
            SetupStep::StartRun.to_error("x".into(), false, None).kind(),
            "run_start_error"
        );
    }

    #[test]
    fn setup_errors_carry_the_retry_after_hint() {
        let err = SetupStep::Upload.to_error("throttled".into(), true, Some(Duration::from_secs(9)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(9)));
        assert!(err.is_retryable());

        let err = SetupStep::StartRun.to_error("x".into(), false, None);
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn retry_after_header_parses_whole_seconds_only() {
        let header = HeaderValue::from_static("30");
        assert_eq!(
            parse_retry_after(Some(&header)),
            Some(Duration::from_secs(30))
        );

        let date = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(Some(&date)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn missing_assistant_text_is_a_run_failure() {
        let err = extract_analysis_text(MessageListResponse { data: Vec::new() }).unwrap_err();
        assert_eq!(err.kind(), "run_failure");

        // A user echo without any assistant reply is still no result.
        let err = extract_analysis_text(MessageListResponse {
            data: vec![ThreadMessage {
                role: "user".to_string(),
                content: vec![MessageContent::Text {
                    text: TextBody {
                        value: "prompt".to_string(),
                    },
                }],
            }],
        })
        .unwrap_err();
        assert_eq!(err.kind(), "run_failure");
    }

    #[test]
    fn assistant_text_is_extracted_from_mixed_content() {
        let text = extract_analysis_text(MessageListResponse {
            data: vec![ThreadMessage {
                role: "assistant".to_string(),
                content: vec![
                    MessageContent::Other,
                    MessageContent::Text {
                        text: TextBody {
                            value: "no visual defects detected".to_string(),
                        },
                    },
                ],
            }],
        })
        .unwrap();
        assert_eq!(text, "no visual defects detected");
    }
}
