use serde::{Deserialize, Serialize};

use crate::definitions::{
    DEFAULT_DISTANCE_THRESHOLD, DEFAULT_MIN_MATCH_RUN_LENGTH, DEFAULT_MIN_QUALITY, HASH_BITS, MAX_QUALITY,
};
use crate::ConfigError;

/// Tolerances applied when comparing two fingerprints.
///
/// * `distance_threshold`: two frames match if their hashes differ in at most this many bits
///   (0..=256). 0 means only identical hashes match.
/// * `min_quality`: frames with a quality below this are ignored on both sides (0..=100).
/// * `min_match_run_length`: the number of consecutive matching frames needed before a run
///   counts towards the score.
///
/// Depending on requirements, useful thresholds appear to be in the range (16..=48).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatchConfig")]
pub struct MatchConfig {
    distance_threshold: u32,
    min_quality: f64,
    min_match_run_length: usize,
}

#[derive(Deserialize)]
struct RawMatchConfig {
    distance_threshold: u32,
    min_quality: f64,
    min_match_run_length: usize,
}

impl TryFrom<RawMatchConfig> for MatchConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMatchConfig) -> Result<Self, Self::Error> {
        Self::new(raw.distance_threshold, raw.min_quality, raw.min_match_run_length)
    }
}

impl MatchConfig {
    /// # Errors
    /// Returns `Err` if any value is outside its valid range.
    pub fn new(distance_threshold: u32, min_quality: f64, min_match_run_length: usize) -> Result<Self, ConfigError> {
        if distance_threshold > HASH_BITS {
            return Err(ConfigError::DistanceThreshold(distance_threshold));
        }
        if !(0.0..=MAX_QUALITY).contains(&min_quality) {
            return Err(ConfigError::MinQuality(min_quality));
        }
        if min_match_run_length == 0 {
            return Err(ConfigError::MinMatchRunLength);
        }

        Ok(Self {
            distance_threshold,
            min_quality,
            min_match_run_length,
        })
    }

    pub fn distance_threshold(&self) -> u32 {
        self.distance_threshold
    }

    pub fn min_quality(&self) -> f64 {
        self.min_quality
    }

    pub fn min_match_run_length(&self) -> usize {
        self.min_match_run_length
    }

    /// True if two frames `distance` bits apart are considered the same frame.
    pub fn within_threshold(&self, distance: u32) -> bool {
        distance <= self.distance_threshold
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            min_quality: DEFAULT_MIN_QUALITY,
            min_match_run_length: DEFAULT_MIN_MATCH_RUN_LENGTH,
        }
    }
}
