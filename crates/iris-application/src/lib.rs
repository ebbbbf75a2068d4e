//! iris-application: the enrichment pipeline and its transport boundary.

pub mod pipeline;
pub mod telemetry;
pub mod transport;

pub use pipeline::EnrichmentPipeline;
pub use transport::{ChannelSink, EventSink, OutboundMessage};
