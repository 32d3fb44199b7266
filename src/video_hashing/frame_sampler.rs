use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use image::DynamicImage;

use crate::DecodeError;

//timestamps within this many seconds of the next sample time are treated as reaching it, so
//that rounding in the decoder's timestamps does not skip a sample.
const SAMPLE_TIME_EPSILON: f64 = 1e-6;

/// A frame as produced by a [`FrameDecoder`].
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub image: DynamicImage,
    /// Presentation time in seconds.
    pub timestamp: f64,
}

/// A frame selected for hashing.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Index of the frame in decode order, counting from 0. Frames that were decoded but not
    /// selected still consume a number.
    pub frame_number: u64,
    pub timestamp: f64,
    pub image: DynamicImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Source of decoded video frames. A decoder is opened when it is constructed and closed
/// when it is dropped.
pub trait FrameDecoder {
    /// The next frame in presentation order, or `None` at the end of the video.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError>;

    /// Duration of the video in seconds, if the decoder knows it.
    fn duration(&self) -> Option<f64> {
        None
    }
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        (**self).next_frame()
    }

    fn duration(&self) -> Option<f64> {
        (**self).duration()
    }
}

/// A decoder over frames that are already in memory.
#[derive(Debug)]
pub struct VecDecoder {
    frames: std::vec::IntoIter<DecodedFrame>,
    duration: f64,
    fail_at: Option<(usize, DecodeError)>,
    position: usize,
}

impl VecDecoder {
    /// Frames at a constant frame rate, starting at time 0.
    pub fn from_images(images: Vec<DynamicImage>, fps: f64) -> Self {
        let frames = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| DecodedFrame {
                image,
                timestamp: i as f64 / fps,
            })
            .collect::<Vec<_>>();
        let duration = frames.len() as f64 / fps;
        Self::new(frames, duration)
    }

    pub fn new(frames: Vec<DecodedFrame>, duration: f64) -> Self {
        Self {
            frames: frames.into_iter(),
            duration,
            fail_at: None,
            position: 0,
        }
    }

    /// Report `error` instead of the frame at `index`. Used to simulate a video that is
    /// corrupted part way through.
    #[must_use]
    pub fn failing_at(mut self, index: usize, error: DecodeError) -> Self {
        self.fail_at = Some((index, error));
        self
    }
}

impl FrameDecoder for VecDecoder {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        if let Some((idx, e)) = &self.fail_at {
            if *idx == self.position {
                return Err(e.clone());
            }
        }
        self.position += 1;
        Ok(self.frames.next())
    }

    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }
}

/// A shared flag used to stop a hashing job early. Clones refer to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the frames of a video were consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Every frame of the video was decoded.
    Complete,
    /// Decoding failed part way through. The frames before the failure are still valid.
    Incomplete(DecodeError),
    /// The job was cancelled. The frames before the cancellation are still valid.
    Cancelled,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Pulls frames from a decoder and selects one every `seconds_per_hash` seconds of video.
///
/// The first frame is always selected. After that, a frame is selected when its timestamp
/// reaches the next sample time. Sample times are on a fixed grid starting at the first
/// frame, so the cadence does not drift when frames are not exactly on the grid. An interval
/// of 0 selects every frame.
///
/// The iterator yields `Ok` frames, then at most one `Err` if decoding failed, then `None`
/// forever.
pub struct FrameSampler<D> {
    decoder: Option<D>,
    seconds_per_hash: f64,
    cancel: CancelToken,

    decoded: u64,
    grid_origin: Option<f64>,
    next_sample_time: f64,
    last_timestamp: f64,

    completion: Option<Completion>,
}

impl<D: FrameDecoder> FrameSampler<D> {
    pub fn new(decoder: D, seconds_per_hash: f64) -> Self {
        Self::with_cancel(decoder, seconds_per_hash, CancelToken::default())
    }

    pub fn with_cancel(decoder: D, seconds_per_hash: f64, cancel: CancelToken) -> Self {
        Self {
            decoder: Some(decoder),
            seconds_per_hash: seconds_per_hash.max(0.0),
            cancel,
            decoded: 0,
            grid_origin: None,
            next_sample_time: 0.0,
            last_timestamp: 0.0,
            completion: None,
        }
    }

    /// How the sampler finished, or `None` if it has not finished yet.
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// The number of frames pulled from the decoder so far (selected or not).
    pub fn frames_decoded(&self) -> u64 {
        self.decoded
    }

    pub fn duration(&self) -> Option<f64> {
        self.decoder.as_ref().and_then(FrameDecoder::duration)
    }

    fn finish(&mut self, completion: Completion) {
        //closes the decoder
        self.decoder = None;
        self.completion = Some(completion);
    }

    fn is_selected(&mut self, timestamp: f64) -> bool {
        let Some(origin) = self.grid_origin else {
            self.grid_origin = Some(timestamp);
            self.next_sample_time = timestamp + self.seconds_per_hash;
            return true;
        };

        if self.seconds_per_hash == 0.0 {
            return true;
        }

        if timestamp + SAMPLE_TIME_EPSILON < self.next_sample_time {
            return false;
        }

        //advance to the first grid point after this frame.
        let intervals = ((timestamp - origin + SAMPLE_TIME_EPSILON) / self.seconds_per_hash).floor();
        self.next_sample_time = origin + (intervals + 1.0) * self.seconds_per_hash;
        true
    }
}

impl<D: FrameDecoder> Iterator for FrameSampler<D> {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.completion.is_some() {
                return None;
            }

            if self.cancel.is_cancelled() {
                debug!(target: "frame_sampler", "cancelled after {} frames", self.decoded);
                self.finish(Completion::Cancelled);
                return None;
            }

            let decoder = self.decoder.as_mut()?;
            let decoded = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    trace!(target: "frame_sampler", "end of video after {} frames", self.decoded);
                    self.finish(Completion::Complete);
                    return None;
                }
                Err(e) => {
                    warn!(target: "frame_sampler", "decoding stopped after {} frames: {e}", self.decoded);
                    self.finish(Completion::Incomplete(e.clone()));
                    return Some(Err(e));
                }
            };

            let timestamp = decoded.timestamp;
            if !timestamp.is_finite() || timestamp < 0.0 || timestamp < self.last_timestamp {
                let e = DecodeError(format!(
                    "frame {} has timestamp {timestamp}, after a frame at {}",
                    self.decoded, self.last_timestamp
                ));
                self.finish(Completion::Incomplete(e.clone()));
                return Some(Err(e));
            }
            self.last_timestamp = timestamp;

            let frame_number = self.decoded;
            self.decoded += 1;

            if self.is_selected(timestamp) {
                return Some(Ok(Frame {
                    frame_number,
                    timestamp,
                    image: decoded.image,
                }));
            }
        }
    }
}

impl<D: FrameDecoder> std::iter::FusedIterator for FrameSampler<D> {}
