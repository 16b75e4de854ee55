//! Stream Lifecycle Controller
//!
//! Presents one shared, multiplexed event source over the native
//! positioning bridge:
//! - Reference-counts subscribers and starts/stops the bridge exactly when
//!   the count crosses zero, serialized by a single lifecycle token so a
//!   draining stop can never race a fresh start.
//! - Routes raw bridge records through the enrichment pipeline
//!   (spoof → privacy → polygon) and fans the enriched stream out to
//!   subscribers plus the trip and workflow state machines.
//! - Wraps bridge failures into [`error_recovery::LocusError`] and routes
//!   them through the shared recovery policy before surfacing them.

mod bridge;
mod config;
mod controller;
mod pipeline;

pub use bridge::{LocationBridge, MockBridge};
pub use config::LocusStreamConfig;
pub use controller::{LocusStream, LocusSubscription};
pub use pipeline::{EnrichmentPipeline, PipelineVerdict};
