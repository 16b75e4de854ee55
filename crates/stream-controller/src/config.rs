//! Stream Configuration

use error_recovery::RecoveryConfig;
use serde::{Deserialize, Serialize};
use spoof_detector::SpoofConfig;
use trip_tracker::TripConfig;

/// Configuration consumed by the stream controller. Parsing and
/// validation happen upstream; this core only reads the values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocusStreamConfig {
    pub spoof: SpoofConfig,
    pub trip: TripConfig,
    pub recovery: RecoveryConfig,
    /// Seed for the privacy obfuscation generator; fixed seeds make
    /// obfuscation reproducible in tests
    pub obfuscation_seed: u64,
    /// Capacity of every broadcast channel
    pub channel_capacity: usize,
}

impl Default for LocusStreamConfig {
    fn default() -> Self {
        Self {
            spoof: SpoofConfig::default(),
            trip: TripConfig::default(),
            recovery: RecoveryConfig::default(),
            obfuscation_seed: 0,
            channel_capacity: 256,
        }
    }
}
