//! iris-interaction: production client for the remote reasoning service.

pub mod agent_service_client;

pub use agent_service_client::AgentServiceClient;
