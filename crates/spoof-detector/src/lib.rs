//! Spoof Detector
//!
//! Analyzes each location sample against a short history of prior fixes
//! and produces a verdict when enough independent factors fire:
//! - the provider-reported mock flag
//! - an impossible implied speed since the previous fix
//! - a streak of identical (rounded) coordinates
//!
//! The detector keeps only a bounded ring of recent samples and a repeat
//! counter; there is no long-term history.

mod config;
mod detector;

pub use config::SpoofConfig;
pub use detector::{SpoofDetector, SpoofFactor, SpoofVerdict};
