use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definitions::{HASH_BITS, MAX_QUALITY, MIN_HASHABLE_DIM};

/// A failure reported by a frame decoder. Decoders are external collaborators, so only the
/// message is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Error type for the reasons why a single frame could not be hashed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashError {
    #[error("frame is {width}x{height}, but frames must be at least {min}x{min}", min = MIN_HASHABLE_DIM)]
    FrameTooSmall { width: u32, height: u32 },
}

/// Error type for the various reasons why a fingerprint could not be created from a video.
///
/// A decode failure part way through a video is not an error: the frames hashed so far are
/// kept and the failure is reported through [`crate::Completion::Incomplete`].
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum HashCreationErrorKind {
    /// The decoder could not be started for the video at src_path.
    #[error("Failed to open video {src_path}: {error}")]
    Open { src_path: PathBuf, error: DecodeError },

    /// A decoded frame could not be hashed.
    #[error("Failed to hash frame {frame_number}: {error}")]
    Hash { frame_number: u64, error: HashError },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start hashing threads: {0}")]
    ThreadPool(String),
}

/// The ordering invariants of a [`crate::FeatureSequence`] were violated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceError {
    #[error("feature {index}: frame number {frame_number} does not follow frame number {previous}")]
    FrameOrder {
        index: usize,
        previous: u64,
        frame_number: u64,
    },

    #[error("feature {index}: timestamp {timestamp} is earlier than the previous timestamp {previous}")]
    TimestampOrder {
        index: usize,
        previous: f64,
        timestamp: f64,
    },

    #[error("feature {index}: timestamp {timestamp} must be finite and non-negative")]
    Timestamp { index: usize, timestamp: f64 },

    #[error("feature {index}: quality {quality} is outside 0..={max}", max = MAX_QUALITY)]
    Quality { index: usize, quality: f64 },
}

/// A configuration value was outside its valid range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("distance threshold {0} is larger than the hash size ({bits} bits)", bits = HASH_BITS)]
    DistanceThreshold(u32),

    #[error("minimum quality {0} is outside 0..={max}", max = MAX_QUALITY)]
    MinQuality(f64),

    #[error("minimum match run length must be at least 1")]
    MinMatchRunLength,

    #[error("seconds per hash {0} must be finite and non-negative")]
    SecondsPerHash(f64),

    #[error("thread count must be at least 1")]
    Threads,

    #[error("cannot split a {bits} bit hash into {0} equal bands", bits = HASH_BITS)]
    Bands(usize),

    #[error("minimum score {0} is outside 0..=1")]
    MinScore(f64),
}

/// The line-by-line matcher was given sequences of different lengths.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[error("cannot compare sequences line by line: lengths differ ({query} vs {reference})")]
pub struct LengthMismatch {
    pub query: usize,
    pub reference: usize,
}
