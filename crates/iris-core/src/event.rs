//! Inbound and outbound bus payloads.

use crate::error::EnrichError;
use serde::{Deserialize, Serialize};

/// One defect-detection event as received from the detector topic.
///
/// Immutable once received; field names match the wire JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionEvent {
    /// ISO-8601 capture timestamp, passed through unchanged.
    pub timestamp: String,
    /// Path or URI of the captured image.
    pub image_path: String,
    /// Label of the detector that flagged the image.
    pub detector: String,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
}

/// The enriched event republished after analysis.
///
/// Carries all original detection fields plus the analysis block. On the
/// emit-error failure policy, `reasoning` holds the failure descriptor and
/// `error_kind` names the taxonomy variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub detection: DetectionEvent,
    pub reasoning: String,
    pub model_used: String,
    pub agent_id: String,
    /// ISO-8601 UTC, set when the analysis finished.
    pub analyzed_at: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl EnrichedEvent {
    /// Builds the success payload for a completed analysis.
    pub fn success(
        detection: DetectionEvent,
        reasoning: &str,
        model_used: &str,
        agent_id: &str,
        correlation_id: String,
    ) -> Self {
        Self {
            detection,
            reasoning: sanitize_reasoning(reasoning),
            model_used: model_used.to_string(),
            agent_id: agent_id.to_string(),
            analyzed_at: now_utc_rfc3339(),
            correlation_id,
            error_kind: None,
        }
    }

    /// Builds the failure payload published under the emit-error policy.
    pub fn failure(
        detection: DetectionEvent,
        error: &EnrichError,
        model_used: &str,
        agent_id: &str,
        correlation_id: String,
    ) -> Self {
        Self {
            detection,
            reasoning: sanitize_reasoning(&error.to_string()),
            model_used: model_used.to_string(),
            agent_id: agent_id.to_string(),
            analyzed_at: now_utc_rfc3339(),
            correlation_id,
            error_kind: Some(error.kind().to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error_kind.is_some()
    }
}

fn now_utc_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Normalizes agent output for single-line JSON consumers: control
/// characters become spaces and whitespace runs collapse.
pub fn sanitize_reasoning(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
