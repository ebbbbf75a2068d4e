//! iris-core: domain model and orchestration core of IRIS.
//!
//! Everything needed to drive one detection event through the remote
//! reasoning lifecycle lives here: the wire payload types, the artifact
//! preparer, the [`client::SessionClient`] capability boundary, the
//! [`orchestrator::ReasoningOrchestrator`] state machine, and the
//! [`tracker::MessageTracker`].

pub mod artifact;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod tracker;

pub use error::{EnrichError, Result};
