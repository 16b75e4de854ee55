//! Spoof Detection Configuration

use serde::{Deserialize, Serialize};

/// Spoof detection knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoofConfig {
    /// Master switch; a disabled detector never produces a verdict
    pub enabled: bool,
    /// Drop samples with a verdict instead of tagging them
    pub block_mock_locations: bool,
    /// Factors that must fire before a verdict is produced
    pub min_factors_for_detection: usize,
    /// Implied speeds above this are considered impossible
    pub max_possible_speed_kph: f64,
    /// Consecutive identical rounded coordinates before the repeat factor fires
    pub repeat_threshold: u32,
    /// Ring-buffer capacity of retained samples
    pub history_size: usize,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_mock_locations: false,
            min_factors_for_detection: 2,
            max_possible_speed_kph: 300.0,
            repeat_threshold: 5,
            history_size: 10,
        }
    }
}
