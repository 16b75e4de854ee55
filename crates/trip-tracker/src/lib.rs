//! Trip State Machine
//!
//! Consumes enriched location samples and manages the idle/active trip
//! lifecycle: explicit or movement-triggered start, distance/duration
//! accumulation, route-deviation detection with re-arming, and summaries
//! on stop. State persists through an injected [`TripStore`] so a process
//! restart resumes the in-flight trip instead of silently dropping it.

mod config;
mod state;
mod store;
mod tracker;

pub use config::TripConfig;
pub use state::{TripState, TripSummary};
pub use store::{MemoryTripStore, StoreError, TripStore};
pub use tracker::{TripEvent, TripTracker};
