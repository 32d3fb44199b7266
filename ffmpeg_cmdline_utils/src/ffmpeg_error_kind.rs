use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::*;

/// Why probing or decoding a video failed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FfmpegError {
    /// `ffmpeg` or `ffprobe` could not be executed, most likely because it is not installed.
    #[error("ffmpeg/ffprobe not found. Make sure both are installed and on the PATH")]
    FfmpegNotFound,

    #[error("I/O error while running ffmpeg: {0}")]
    Io(String),

    /// The tool exited with a failure status. Holds the start of its stderr.
    #[error("ffmpeg failed: {0}")]
    FfmpegInternal(String),

    #[error("ffmpeg/ffprobe output is not valid utf8")]
    Utf8Conversion,

    /// No video stream with a nonzero width and height (audio-only files end up here), or a
    /// frame too large to buffer.
    #[error("no video stream with a usable resolution")]
    InvalidResolution,

    /// The output of ffmpeg ended part way through a frame.
    #[error("ffmpeg output ended part way through frame {frame_index} ({bytes_read} of {frame_size} bytes)")]
    TruncatedFrame {
        frame_index: u64,
        bytes_read: usize,
        frame_size: usize,
    },

    #[error("ffmpeg timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to get video properties: {0}")]
    Info(#[from] VideoInfoError),
}
