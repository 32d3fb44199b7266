use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::*;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Error)]
pub enum VideoInfoError {
    #[error("Malformed ffprobe output: {0}")]
    Json(String),
    #[error("Malformed number in ffprobe output: {0}")]
    Number(String),
    #[error("Unexpected video rotation: {0}")]
    Rotation(String),
}

impl From<serde_json::Error> for VideoInfoError {
    fn from(e: serde_json::Error) -> Self {
        //serde messages can quote large parts of the input
        Self::Json(e.to_string().chars().take(500).collect())
    }
}

// The subset of `ffprobe -show_format -show_streams -print_format json` that is used.
#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u64>,
    height: Option<u64>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Deserialize)]
struct SideData {
    rotation: Option<Rotation>,
}

// older ffprobe versions quote the rotation
#[derive(Deserialize)]
#[serde(untagged)]
enum Rotation {
    Degrees(i64),
    Text(String),
}

impl Rotation {
    fn degrees(&self) -> Result<i64, VideoInfoError> {
        match self {
            Self::Degrees(d) => Ok(*d),
            Self::Text(s) => s.trim().parse().map_err(|_| VideoInfoError::Rotation(s.clone())),
        }
    }
}

impl ProbeStream {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    // The stored resolution is before rotation. ffmpeg autorotates frames, so a quarter turn
    // swaps the axes.
    fn displayed_resolution(&self) -> Result<(u32, u32), VideoInfoError> {
        let dim = |v: Option<u64>| v.and_then(|v| u32::try_from(v).ok()).unwrap_or(0);
        let (w, h) = (dim(self.width), dim(self.height));

        let rotation = match self.side_data_list.iter().find_map(|sd| sd.rotation.as_ref()) {
            Some(rotation) => rotation.degrees()?,
            None => 0,
        };

        match rotation.rem_euclid(360) {
            0 | 180 => Ok((w, h)),
            90 | 270 => Ok((h, w)),
            _ => Err(VideoInfoError::Rotation(rotation.to_string())),
        }
    }

    //avg_frame_rate is what players use. r_frame_rate is the container's base rate and is
    //only a fallback.
    fn frame_rate(&self) -> Option<f64> {
        [&self.avg_frame_rate, &self.r_frame_rate]
            .into_iter()
            .find_map(|rate| rate.as_deref().and_then(parse_rational))
    }
}

/// Some of the video metadata that can be obtained by using ffprobe.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize, Default)]
pub struct VideoInfo {
    duration: Duration,
    file_size: u64,
    resolution: (u32, u32),
    frame_rate: Option<f64>,
}

impl VideoInfo {
    /// Use ffprobe to get the duration, resolution and frame rate of a video. Only the first
    /// video stream is considered.
    ///
    /// # errors
    /// * The file cannot be read or is not recognized as a video by ffprobe
    /// * The output from ffprobe is malformed
    pub fn new<P>(src_path: P) -> Result<Self, FfmpegError>
    where
        P: AsRef<Path>,
    {
        let stats_string = get_video_stats(&src_path)?;
        Ok(Self::from_ffprobe_json(&stats_string)?)
    }

    /// Parse the output of `ffprobe -show_format -show_streams -print_format json`.
    pub fn from_ffprobe_json(stats_string: &str) -> Result<Self, VideoInfoError> {
        let probe: ProbeOutput = serde_json::from_str(stats_string)?;

        let duration = match &probe.format.duration {
            Some(d) => {
                let secs = d.trim().parse::<f64>().map_err(|e| VideoInfoError::Number(format!("{d}: {e}")))?;
                Duration::from_secs_f64(secs.max(0.0))
            }
            None => Duration::ZERO,
        };

        let file_size = match &probe.format.size {
            Some(s) => s.trim().parse::<u64>().map_err(|e| VideoInfoError::Number(format!("{s}: {e}")))?,
            None => 0,
        };

        let (resolution, frame_rate) = match probe.streams.iter().find(|s| s.is_video()) {
            Some(video) => (video.displayed_resolution()?, video.frame_rate()),
            None => ((0, 0), None),
        };

        Ok(VideoInfo {
            duration,
            file_size,
            resolution,
            frame_rate,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The size of the video in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The resolution of the video in pixels, in the orientation it is meant to be viewed.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// The average frame rate of the first video stream, if ffprobe reported a usable one.
    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }
}

// ffprobe writes rates as "num/den", e.g "30000/1001". "0/0" means unknown.
fn parse_rational(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num = num.trim().parse::<f64>().ok()?;
    let den = den.trim().parse::<f64>().ok()?;
    let rate = num / den;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
