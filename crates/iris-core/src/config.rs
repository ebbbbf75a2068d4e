//! Configuration surface, loaded from environment variables with
//! defaults so the service starts in a development setup without any.

use crate::orchestrator::RunPolicy;
use std::env;
use std::time::Duration;

/// What to do with a request that failed enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Publish a failure record on the output topic.
    #[default]
    EmitError,
    /// Log the failure and publish nothing.
    Drop,
}

impl FailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "emit" | "emit_error" => Some(Self::EmitError),
            "drop" => Some(Self::Drop),
            _ => None,
        }
    }
}

/// Static configuration of the enrichment service.
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Base URL of the remote agent service project.
    pub endpoint: String,
    /// Identifier of the reasoning agent to invoke.
    pub agent_id: String,
    /// Label stamped into `model_used` on published events.
    pub model_label: String,
    /// Topic the detector publishes raw events on.
    pub input_topic: String,
    /// Topic enriched events are published on.
    pub output_topic: String,
    /// Maximum simultaneously in-flight orchestrator runs.
    pub concurrency_limit: usize,
    pub poll_interval: Duration,
    pub run_deadline: Duration,
    pub setup_attempts: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8890/api/projects/inspection".to_string(),
            agent_id: String::new(),
            model_label: "agent_service".to_string(),
            input_topic: "factory/line1/defects".to_string(),
            output_topic: "factory/line1/defects/enriched".to_string(),
            concurrency_limit: 4,
            poll_interval: Duration::from_millis(1500),
            run_deadline: Duration::from_secs(60),
            setup_attempts: 3,
            failure_policy: FailurePolicy::EmitError,
        }
    }
}

impl ReasonerConfig {
    /// Reads configuration from `IRIS_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_string("IRIS_ENDPOINT", defaults.endpoint),
            agent_id: env_string("IRIS_AGENT_ID", defaults.agent_id),
            model_label: env_string("IRIS_MODEL_LABEL", defaults.model_label),
            input_topic: env_string("IRIS_INPUT_TOPIC", defaults.input_topic),
            output_topic: env_string("IRIS_OUTPUT_TOPIC", defaults.output_topic),
            concurrency_limit: env_parsed("IRIS_CONCURRENCY", defaults.concurrency_limit),
            poll_interval: Duration::from_millis(env_parsed(
                "IRIS_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            run_deadline: Duration::from_secs(env_parsed(
                "IRIS_RUN_DEADLINE_SECS",
                defaults.run_deadline.as_secs(),
            )),
            setup_attempts: env_parsed("IRIS_SETUP_ATTEMPTS", defaults.setup_attempts),
            failure_policy: env::var("IRIS_FAILURE_POLICY")
                .ok()
                .and_then(|v| FailurePolicy::parse(&v))
                .unwrap_or(defaults.failure_policy),
        }
    }

    /// The orchestrator policy slice of this configuration.
    pub fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            agent_id: self.agent_id.clone(),
            poll_interval: self.poll_interval,
            run_deadline: self.run_deadline,
            setup_attempts: self.setup_attempts,
            ..RunPolicy::default()
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ReasonerConfig::default();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.run_deadline, Duration::from_secs(60));
        assert_eq!(config.setup_attempts, 3);
        assert_eq!(config.failure_policy, FailurePolicy::EmitError);
        assert_eq!(config.input_topic, "factory/line1/defects");
        assert_eq!(config.output_topic, "factory/line1/defects/enriched");
    }

    #[test]
    fn run_policy_carries_timing_fields() {
        let config = ReasonerConfig {
            agent_id: "agent-7".to_string(),
            poll_interval: Duration::from_millis(250),
            run_deadline: Duration::from_secs(10),
            ..ReasonerConfig::default()
        };
        let policy = config.run_policy();
        assert_eq!(policy.agent_id, "agent-7");
        assert_eq!(policy.poll_interval, Duration::from_millis(250));
        assert_eq!(policy.run_deadline, Duration::from_secs(10));
    }

    #[test]
    fn failure_policy_parsing() {
        assert_eq!(FailurePolicy::parse("emit"), Some(FailurePolicy::EmitError));
        assert_eq!(
            FailurePolicy::parse("Emit_Error"),
            Some(FailurePolicy::EmitError)
        );
        assert_eq!(FailurePolicy::parse("drop"), Some(FailurePolicy::Drop));
        assert_eq!(FailurePolicy::parse("whatever"), None);
    }
}
