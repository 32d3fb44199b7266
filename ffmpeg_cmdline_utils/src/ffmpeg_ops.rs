use std::{
    ffi::{OsStr, OsString},
    io::prelude::*,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    time::{Duration, Instant},
};

#[cfg(target_family = "windows")]
use std::os::windows::process::CommandExt;

use image::{DynamicImage, GrayImage, RgbImage};
use wait_timeout::ChildExt;
use FfmpegCommandName::*;
use FfmpegError::*;

use crate::*;

const FFPROBE_TIMEOUT_SECS: u64 = 60;

//used when ffprobe cannot tell us the frame rate of a video.
const FALLBACK_FRAME_RATE: f64 = 25.0;

// Attempt to prevent OOM on very implausible sizes
const MAX_FRAME_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// A decoded frame and its position in the video.
#[derive(Debug, Clone)]
pub struct TimestampedFrame {
    /// Index of the frame in the output of ffmpeg, counting from 0.
    pub index: u64,
    /// Presentation time in seconds, relative to the start of decoding.
    pub timestamp: f64,
    pub image: DynamicImage,
}

/// Iterator over the frames of a running ffmpeg process.
///
/// Yields frames until ffmpeg closes its output. If ffmpeg stops part way through a frame, or
/// exits with a failure status, one final `Err` is yielded. The ffmpeg process is killed and
/// reaped when the iterator is dropped.
#[derive(Debug)]
pub struct FfmpegFrames {
    x: u32,
    y: u32,
    grayscale: bool,
    frame_rate: f64,
    child: Child,
    stdout: Option<ChildStdout>,
    frames_read: u64,
    timeout: Option<(Instant, u64)>,
    finished: bool,
}

impl FfmpegFrames {
    /// Resolution of the frames produced by this iterator.
    pub fn resolution(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// The constant rate at which ffmpeg outputs frames.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_size(&self) -> usize {
        let pixels = self.x as usize * self.y as usize;
        if self.grayscale {
            pixels
        } else {
            pixels * 3
        }
    }

    fn timed_out(&self) -> Option<FfmpegError> {
        match self.timeout {
            Some((deadline, secs)) if Instant::now() > deadline => Some(Timeout(secs)),
            _ => None,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.stdout = None;
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
    }

    //called once ffmpeg has closed stdout on a frame boundary.
    fn exit_status(&mut self) -> Result<(), FfmpegError> {
        self.stdout = None;
        let status = match self.timeout {
            Some((deadline, secs)) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.child.wait_timeout(remaining) {
                    Ok(Some(status)) => status,
                    Ok(None) => return Err(Timeout(secs)),
                    Err(e) => return Err(Io(format!("{:?}", e.kind()))),
                }
            }
            None => self
                .child
                .wait()
                .map_err(|e| Io(format!("{:?}", e.kind())))?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(FfmpegInternal(format!(
                "ffmpeg exited with {status} after {} frames",
                self.frames_read
            )))
        }
    }

    fn read_frame(&mut self) -> Option<Result<TimestampedFrame, FfmpegError>> {
        let frame_size = self.frame_size();
        let mut raw_buf = vec![0u8; frame_size];

        let mut buf_head = 0;
        while buf_head < raw_buf.len() {
            if let Some(e) = self.timed_out() {
                return Some(Err(e));
            }

            let stdout = self.stdout.as_mut()?;
            match stdout.read(&mut raw_buf[buf_head..]) {
                Ok(0) => break,
                Ok(bytes_read) => buf_head += bytes_read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(Io(format!("{:?}", e.kind())))),
            }
        }

        //end of output exactly on a frame boundary.
        if buf_head == 0 {
            return match self.exit_status() {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            };
        }

        if buf_head < frame_size {
            return Some(Err(TruncatedFrame {
                frame_index: self.frames_read,
                bytes_read: buf_head,
                frame_size,
            }));
        }

        //the buffer is exactly the size of one frame.
        let image = if self.grayscale {
            DynamicImage::ImageLuma8(GrayImage::from_raw(self.x, self.y, raw_buf)?)
        } else {
            DynamicImage::ImageRgb8(RgbImage::from_raw(self.x, self.y, raw_buf)?)
        };

        let index = self.frames_read;
        self.frames_read += 1;

        Some(Ok(TimestampedFrame {
            index,
            timestamp: index as f64 / self.frame_rate,
            image,
        }))
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<TimestampedFrame, FfmpegError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let ret = self.read_frame();
        if !matches!(ret, Some(Ok(_))) {
            self.finish();
        }
        ret
    }
}

impl std::iter::FusedIterator for FfmpegFrames {}

// to prevent accumulation of zombie processes, reap the return code of
// ffmpeg subcommands (if nothing else has done so already) here
impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
    }
}

/// Configures and spawns an ffmpeg process that decodes a video into raw frames.
#[derive(Clone, Debug)]
pub struct FfmpegFrameReaderBuilder {
    src_path: PathBuf,
    fps: Option<f64>,
    max_dimension: Option<u32>,
    grayscale: bool,
    timeout_secs: Option<u64>,
}

impl FfmpegFrameReaderBuilder {
    pub fn new(src_path: impl AsRef<Path>) -> Self {
        Self {
            src_path: src_path.as_ref().to_path_buf(),
            fps: None,
            max_dimension: None,
            grayscale: false,
            timeout_secs: None,
        }
    }

    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    /// Output frames at this constant rate, duplicating or dropping frames as needed. By default
    /// the frame rate reported by ffprobe is used.
    pub fn fps(&mut self, fps: f64) -> &mut Self {
        self.fps = Some(fps);
        self
    }

    /// Scale frames down (keeping the aspect ratio) so that neither side exceeds this many pixels.
    pub fn max_dimension(&mut self, max_dimension: u32) -> &mut Self {
        self.max_dimension = Some(max_dimension);
        self
    }

    pub fn grayscale(&mut self, val: bool) -> &mut Self {
        self.grayscale = val;
        self
    }

    pub fn timeout_secs(&mut self, timeout_secs: u64) -> &mut Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Probe the video and start decoding it.
    ///
    /// # Errors
    /// Fails if ffprobe cannot read the video, the video has no usable resolution, or ffmpeg
    /// cannot be started.
    pub fn spawn(&self) -> Result<(FfmpegFrames, VideoInfo), FfmpegError> {
        //we also need to find out the resolution of the video so that stdout can be converted into frames.
        let stats = VideoInfo::new(&self.src_path)?;

        //bail out if we get invalid dimensions.
        let (x, y) = output_resolution(stats.resolution(), self.max_dimension);
        if x == 0 || y == 0 {
            return Err(InvalidResolution);
        }
        let frame_bytes = u64::from(x) * u64::from(y) * if self.grayscale { 1 } else { 3 };
        if frame_bytes > MAX_FRAME_BYTES {
            return Err(InvalidResolution);
        }

        let frame_rate = self
            .fps
            .or_else(|| stats.frame_rate())
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(FALLBACK_FRAME_RATE);

        let args = self.args(x, y, frame_rate);

        let mut child = spawn_ffmpeg_command(Ffmpeg, &args, true)?;
        let stdout = child.stdout.take();

        let frames = FfmpegFrames {
            x,
            y,
            grayscale: self.grayscale,
            frame_rate,
            child,
            stdout,
            frames_read: 0,
            timeout: self
                .timeout_secs
                .map(|secs| (Instant::now() + Duration::from_secs(secs), secs)),
            finished: false,
        };

        Ok((frames, stats))
    }

    fn args(&self, x: u32, y: u32, frame_rate: f64) -> Vec<OsString> {
        #[rustfmt::skip]
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(), "warning".into(),
            "-nostats".into(),
        ];

        args.extend(["-i".into(), self.src_path.as_os_str().to_owned()]);

        #[rustfmt::skip]
        args.extend([
            "-an".into(),
            "-r".into(),       format!("{frame_rate}").into(),
            "-s".into(),       format!("{x}x{y}").into(),
            "-pix_fmt".into(), (if self.grayscale { "gray" } else { "rgb24" }).into(),
            "-c:v".into(),     "rawvideo".into(),
            "-f".into(),       "image2pipe".into(),
            "-".into(),
        ]);

        args
    }
}

//scale down to fit within max_dimension, keeping the aspect ratio and even sizes that all
//pixel formats accept.
fn output_resolution((x, y): (u32, u32), max_dimension: Option<u32>) -> (u32, u32) {
    let Some(max_dim) = max_dimension else {
        return (x, y);
    };
    let longest = x.max(y);
    if longest <= max_dim || longest == 0 {
        return (x, y);
    }

    let scale = f64::from(max_dim) / f64::from(longest);
    let fit = |v: u32| ((f64::from(v) * scale / 2.0).round() as u32 * 2).max(2);
    (fit(x), fit(y))
}

pub fn get_video_stats<P: AsRef<Path>>(src_path: P) -> Result<String, FfmpegError> {
    let args = &[
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-show_format"),
        OsStr::new("-show_streams"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        OsStr::new(src_path.as_ref()),
    ];

    let stdout = run_ffmpeg_command(Ffprobe, args)?.stdout;

    String::from_utf8(stdout).map_err(|_| Utf8Conversion)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FfmpegCommandName {
    Ffprobe,
    Ffmpeg,
}

impl FfmpegCommandName {
    pub fn as_os_str(&self) -> &'static OsStr {
        match self {
            Self::Ffprobe => OsStr::new("ffprobe"),
            Self::Ffmpeg => OsStr::new("ffmpeg"),
        }
    }
}

fn spawn_ffmpeg_command<S: AsRef<OsStr>>(
    name: FfmpegCommandName,
    args: &[S],
    stderr_null: bool,
) -> Result<Child, FfmpegError> {
    let stderr_cfg = if stderr_null {
        Stdio::null()
    } else {
        Stdio::piped()
    };

    let mut command = Command::new(name.as_os_str());
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(stderr_cfg);

    //do not spawn a command window on windows when when in a gui application
    #[cfg(target_family = "windows")]
    command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);

    command.spawn().map_err(|e| match e.kind() {
        //shell failed to execute the command. Separate out FileNotFound from all other errors
        //as by far the most likely cause is ffmpeg is not installed.
        std::io::ErrorKind::NotFound => FfmpegNotFound,
        _ => Io(format!("{:?}", e.kind())),
    })
}

struct FfmpegOutput {
    stdout: Vec<u8>,
}

fn run_ffmpeg_command(name: FfmpegCommandName, args: &[&OsStr]) -> Result<FfmpegOutput, FfmpegError> {
    fn truncate_ffmpeg_err_msg(stderr: &[u8]) -> FfmpegError {
        match std::str::from_utf8(stderr) {
            Ok(error_text) => FfmpegInternal(error_text.chars().take(500).collect::<String>()),
            Err(_) => Utf8Conversion,
        }
    }

    fn drain(mut pipe: impl Read + Send + 'static) -> std::thread::JoinHandle<Vec<u8>> {
        std::thread::spawn(move || {
            let mut acc = vec![];
            let _read_error = pipe.read_to_end(&mut acc);
            acc
        })
    }

    let mut child = spawn_ffmpeg_command(name, args, false)?;

    //Read stdout and stderr on their own threads so that a full pipe cannot stall the child
    //while we wait for it.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match child.wait_timeout(Duration::from_secs(FFPROBE_TIMEOUT_SECS)) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _kill_error = child.kill();
            let _wait_error = child.wait();
            return Err(Timeout(FFPROBE_TIMEOUT_SECS));
        }
        Err(e) => return Err(Io(format!("{:?}", e.kind()))),
    };

    let join = |handle: Option<std::thread::JoinHandle<Vec<u8>>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    let stdout = join(stdout);
    let stderr = join(stderr);

    if status.success() {
        Ok(FfmpegOutput { stdout })
    } else {
        //sometimes ffmpeg creates very long error messages. Limit them to the first 500 characters
        Err(truncate_ffmpeg_err_msg(&stderr))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_output_resolution() {
        assert_eq!(output_resolution((1920, 1080), None), (1920, 1080));
        assert_eq!(output_resolution((1920, 1080), Some(4000)), (1920, 1080));
        assert_eq!(output_resolution((1920, 1080), Some(512)), (512, 288));
        assert_eq!(output_resolution((1080, 1920), Some(512)), (288, 512));
        assert_eq!(output_resolution((5000, 3), Some(100)), (100, 2));
    }

    #[test]
    fn test_args() {
        let mut builder = FfmpegFrameReaderBuilder::new("/videos/cat.mp4");
        builder.grayscale(true).timeout_secs(30);
        let args = builder
            .args(64, 48, 29.97)
            .into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        let pos = |s: &str| args.iter().position(|a| a == s).unwrap();
        assert_eq!(args[pos("-i") + 1], "/videos/cat.mp4");
        assert_eq!(args[pos("-r") + 1], "29.97");
        assert_eq!(args[pos("-s") + 1], "64x48");
        assert_eq!(args[pos("-pix_fmt") + 1], "gray");
        assert!(pos("-nostats") < pos("-i"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }
}
