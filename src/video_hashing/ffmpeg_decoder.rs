use std::path::Path;

use ffmpeg_cmdline_utils::{FfmpegFrameReaderBuilder, FfmpegFrames};

use crate::{DecodeError, DecodedFrame, FrameDecoder};

/// Decodes a video file by running the `ffmpeg` command line tool.
///
/// Frames are produced in rgb24 at the frame rate reported by ffprobe, optionally scaled down so
/// that neither side exceeds `max_dimension`. The ffmpeg process is stopped when the decoder is
/// dropped.
pub struct FfmpegDecoder {
    frames: FfmpegFrames,
    duration: f64,
}

impl FfmpegDecoder {
    /// Probe the video at `src_path` and start decoding it.
    ///
    /// # Errors
    /// Returns `Err` if ffmpeg/ffprobe are not installed, the file is not a video, or ffmpeg
    /// could not be started.
    pub fn open(
        src_path: impl AsRef<Path>,
        max_dimension: Option<u32>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, DecodeError> {
        let mut builder = FfmpegFrameReaderBuilder::new(src_path.as_ref());
        if let Some(max_dimension) = max_dimension {
            builder.max_dimension(max_dimension);
        }
        if let Some(timeout_secs) = timeout_secs {
            builder.timeout_secs(timeout_secs);
        }

        let (frames, info) = builder
            .spawn()
            .map_err(|e| DecodeError(e.to_string()))?;

        debug!(
            target: "ffmpeg_decoder",
            "decoding {} at {:?} {:.3}fps",
            src_path.as_ref().display(),
            frames.resolution(),
            frames.frame_rate()
        );

        Ok(Self {
            frames,
            duration: info.duration().as_secs_f64(),
        })
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        match self.frames.next() {
            None => Ok(None),
            Some(Ok(frame)) => Ok(Some(DecodedFrame {
                image: frame.image,
                timestamp: frame.timestamp,
            })),
            Some(Err(e)) => Err(DecodeError(e.to_string())),
        }
    }

    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }
}
