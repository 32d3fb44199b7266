//! Thin wrappers around the `ffmpeg` and `ffprobe` command line tools.
//!
//! * [`VideoInfo`] probes a file for its duration, resolution and frame rate.
//! * [`FfmpegFrameReaderBuilder`] spawns ffmpeg and iterates over the decoded frames of a video
//!   as raw rgb24 or gray images, each tagged with its presentation time.
//!
//! Both tools must be installed and visible on the command line.

mod ffmpeg_error_kind;
mod ffmpeg_ops;
mod ffmpeg_stats;

pub use ffmpeg_error_kind::*;
pub use ffmpeg_ops::*;
pub use ffmpeg_stats::*;
