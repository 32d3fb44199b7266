// Frame definitions (pre hashing)
pub const DOWNSAMPLE_DIM: usize = 64;

//frames smaller than this in either direction cannot be hashed.
pub const MIN_HASHABLE_DIM: u32 = 5;

//the Jarosz filter window is the frame dimension divided by this, rounded up.
pub const JAROSZ_WINDOW_DIVISOR: usize = 2 * DOWNSAMPLE_DIM;

// Hash definitions
pub const HASH_DIM: usize = 16;
pub const HASH_BITS: u32 = (HASH_DIM * HASH_DIM) as u32;
pub const HASH_WORDS: usize = HASH_BITS as usize / 64;
pub const HASH_HEX_LEN: usize = HASH_BITS as usize / 4;

//Quality is the standard deviation of the (orthonormal) hash coefficients, scaled by this
//and clamped into 0..=100
pub const QUALITY_PER_ENERGY: f64 = 1.0;
pub const MAX_QUALITY: f64 = 100.0;

/// The default sampling interval. One frame is hashed for each second of video.
///
/// Unit: Seconds. Zero means every decoded frame is hashed.
pub const DEFAULT_SECONDS_PER_HASH: f64 = 1.0;

/// The default maximum Hamming distance (out of 256 bits) at which two frames are
/// considered to match.
pub const DEFAULT_DISTANCE_THRESHOLD: u32 = 31;

/// The default minimum quality. Frames below this are excluded from matching and scoring.
pub const DEFAULT_MIN_QUALITY: f64 = 50.0;

/// The default minimum number of consecutive matched frames that forms a matched segment.
pub const DEFAULT_MIN_MATCH_RUN_LENGTH: usize = 1;

// Fingerprint text format
pub const FORMAT_VERSION: u32 = 1;
pub const FORMAT_NUM_FIELDS: usize = 4;
pub const TIMESTAMP_DECIMALS: usize = 3;

/// The default number of bit bands a [`crate::FeatureIndex`] splits each hash into.
pub const DEFAULT_INDEX_BANDS: usize = 16;
