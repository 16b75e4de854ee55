//! Error Classification & Recovery Policy
//!
//! The shared failure taxonomy for the location pipeline:
//! - [`LocusError`]: the error type every component wraps failures into.
//! - [`classify`]: substring heuristics mapping raw messages to a
//!   [`LocusErrorType`].
//! - [`RecoveryManager`]: per-type retry counting with exponential backoff,
//!   an ignore-set, and a ceiling after which the decision degrades to
//!   low-power fallback instead of another retry.

mod classify;
mod error;
mod recovery;

pub use classify::classify;
pub use error::{LocusError, LocusErrorType, RecoveryAction};
pub use recovery::{RecoveryConfig, RecoveryDecision, RecoveryManager};
