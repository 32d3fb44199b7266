#![allow(clippy::let_and_return)]
#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]
#![allow(clippy::doc_markdown)]

//! # Overview
//! vpdq_lib computes perceptual fingerprints of videos and compares them, to find videos (or
//! parts of videos) that look the same even after re-encoding, resizing, cropping or a change
//! of frame rate.
//!
//! # How it works
//! A video is sampled at a fixed interval (one frame per second by default). Each sampled
//! frame is reduced to a 256-bit hash built from the low frequency components of its
//! [discrete cosine transform](http://hackerfactor.com/blog/index.php%3F/archives/432-Looks-Like-It.html),
//! plus a quality score in 0..=100 that says how much detail the frame had. Flat or blurred
//! frames get a low quality and are ignored when matching.
//!
//! The fingerprint of a video is the ordered list of these per-frame features, a
//! [`FeatureSequence`]. Two fingerprints are compared by aligning frames whose hashes are
//! within a Hamming distance threshold, keeping the alignment in order on both sides. The
//! score is the fraction of usable frames that were matched.
//!
//! # High Level API
//! ```rust,no_run
//! use vpdq_lib::{match_sequences, CancelToken, CreationOptions, MatchConfig, VpdqHashBuilder};
//!
//! let builder = VpdqHashBuilder::from_options(CreationOptions::default()).unwrap();
//! let a = builder.hash_path("a.mp4", &CancelToken::new()).unwrap();
//! let b = builder.hash_path("b.mkv", &CancelToken::new()).unwrap();
//!
//! let res = match_sequences(&a.sequence, &b.sequence, &MatchConfig::default());
//! println!("{:.1}% of a is in b", res.score * 100.0);
//!
//! //fingerprints can be stored and reloaded later.
//! vpdq_lib::codec::write_file(&a.sequence, "a.vpdq").unwrap();
//! ```
//!
//! ## Matching functions
//! * To compare two fingerprints: [`crate::match_sequences`]
//! * To compare two fingerprints of the same video frame by frame: [`crate::match_by_line`]
//! * To search many stored fingerprints: [`crate::FeatureIndex`]
//!
//! # Fingerprint files
//! Fingerprints are stored as text, one line per sampled frame:
//! `frame_number,quality,hash_hex,timestamp`. See [`crate::codec`].
//!
//! # Prerequisites
//! With the default `ffmpeg_backend` feature, videos are decoded by calling Ffmpeg from the
//! command line. You must make Ffmpeg and Ffprobe available on the command line, for example:
//!
//! * Debian-based systems: ```# apt-get install ffmpeg```
//! * Yum-based systems: ```# yum install ffmpeg```
//! * Windows:
//!     1) Download the correct installer from <https://ffmpeg.org/download.html>
//!     2) Run the installer and install ffmpeg to any directory
//!     3) Add the directory into the PATH environment variable
//!
//! Without the feature, frames can be supplied by any type implementing [`FrameDecoder`].

#[macro_use]
extern crate log;

pub(crate) mod dct_hasher;
pub(crate) mod definitions;
pub(crate) mod utils;
pub(crate) mod video_hashing;

pub use dct_hasher::{hash_image, FrameHash};

pub use video_hashing::{
    codec,
    codec::{FingerprintFileError, FormatError, FormatErrorKind},
    distance::MatchConfig,
    errors::{ConfigError, DecodeError, HashCreationErrorKind, HashError, LengthMismatch, SequenceError},
    feature::{FeatureSequence, VpdqFeature},
    frame_sampler::{CancelToken, Completion, DecodedFrame, Frame, FrameDecoder, FrameSampler, VecDecoder},
    hash256::{Hash256, HashParseError},
    matches::match_result::{LineMatch, MatchResult, MatchedPair, MatchedSegment},
    quality::quality_from_energy,
    search::{FeatureIndex, IndexConfig, IndexMatch},
    video_dup_finder::*,
    video_hash_builder::{hash_frame, hash_videos, CreationOptions, HashOutcome, VpdqHashBuilder},
};

#[cfg(feature = "ffmpeg_backend")]
pub use video_hashing::ffmpeg_decoder::FfmpegDecoder;

pub use definitions::{
    DEFAULT_DISTANCE_THRESHOLD, DEFAULT_INDEX_BANDS, DEFAULT_MIN_MATCH_RUN_LENGTH, DEFAULT_MIN_QUALITY,
    DEFAULT_SECONDS_PER_HASH, FORMAT_VERSION, HASH_BITS, MAX_QUALITY,
};

#[doc(hidden)]
/// Helpers for building synthetic hashes, fingerprints and frames.
/// These functions are not part of the stable API.
pub use video_hashing::test_util;
