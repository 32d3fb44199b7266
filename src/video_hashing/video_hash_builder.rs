use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dct_hasher::hash_image;
use crate::definitions::DEFAULT_SECONDS_PER_HASH;
use crate::{
    CancelToken, Completion, ConfigError, FeatureSequence, Frame, FrameDecoder, FrameSampler,
    HashCreationErrorKind, VpdqFeature,
};

/// Options for how videos will be processed when generating fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreationOptions {
    /// The interval between sampled frames.
    ///
    /// Unit: Seconds. 0 means every decoded frame is hashed.
    pub seconds_per_hash: f64,

    /// Number of threads used to hash the frames of one video.
    pub hash_threads: usize,

    /// Maximum number of videos decoded at the same time by [`hash_videos`]. Each open video
    /// holds one decoder.
    pub max_concurrent_videos: usize,

    /// If set, frames are scaled down by the decoder so that neither side exceeds this many
    /// pixels. Hashes are computed at 64x64 anyway, so this mostly saves decoding bandwidth.
    pub max_decode_dimension: Option<u32>,

    /// If set, decoding a single video is abandoned after this many seconds.
    pub decode_timeout_secs: Option<u64>,
}

impl Default for CreationOptions {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map_or(1, usize::from);
        Self {
            seconds_per_hash: DEFAULT_SECONDS_PER_HASH,
            hash_threads: threads,
            max_concurrent_videos: 1,
            max_decode_dimension: Some(512),
            decode_timeout_secs: None,
        }
    }
}

impl CreationOptions {
    /// # Errors
    /// Returns `Err` if the sampling interval is negative or not finite, or a thread count is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.seconds_per_hash.is_finite() || self.seconds_per_hash < 0.0 {
            return Err(ConfigError::SecondsPerHash(self.seconds_per_hash));
        }
        if self.hash_threads == 0 || self.max_concurrent_videos == 0 {
            return Err(ConfigError::Threads);
        }
        Ok(())
    }
}

/// The fingerprint of a video and how much of the video it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct HashOutcome {
    pub sequence: FeatureSequence,
    /// Whether every frame was decoded. When decoding stopped early the sequence holds the
    /// frames hashed before that point.
    pub completion: Completion,
    /// Frames pulled from the decoder, including frames that were not sampled.
    pub frames_decoded: u64,
}

/// A factory for video fingerprints.
///
/// Frames are decoded sequentially and hashed in parallel on a dedicated thread pool. The
/// resulting features are always in decode order.
pub struct VpdqHashBuilder {
    options: CreationOptions,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for VpdqHashBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpdqHashBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl VpdqHashBuilder {
    /// Create a hash builder with the selected [`CreationOptions`].
    ///
    /// # Errors
    /// Returns `Err` if the options are invalid or the thread pool cannot be created.
    pub fn from_options(options: CreationOptions) -> Result<Self, HashCreationErrorKind> {
        options.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.hash_threads)
            .thread_name(|i| format!("vpdq-hash-{i}"))
            .build()
            .map_err(|e| HashCreationErrorKind::ThreadPool(e.to_string()))?;
        Ok(Self { options, pool })
    }

    pub fn options(&self) -> &CreationOptions {
        &self.options
    }

    /// Fingerprint the frames produced by `decoder`.
    ///
    /// A decode failure part way through is reported through [`HashOutcome::completion`]
    /// rather than as an error, as is cancellation through `cancel`.
    ///
    /// # Errors
    /// Returns `Err` if a frame cannot be hashed.
    pub fn hash_decoder<D>(
        &self,
        decoder: D,
        cancel: &CancelToken,
    ) -> Result<HashOutcome, HashCreationErrorKind>
    where
        D: FrameDecoder + Send,
    {
        let duration = decoder.duration();
        let mut sampler = FrameSampler::with_cancel(decoder, self.options.seconds_per_hash, cancel.clone());

        let features = self.pool.install(|| {
            (&mut sampler)
                .par_bridge()
                //decode errors end the sampler, which records them as its completion.
                .filter_map(Result::ok)
                .map(|frame| hash_frame(&frame))
                .collect::<Result<Vec<_>, _>>()
        })?;

        self.finish(sampler, features, duration)
    }

    /// As [`VpdqHashBuilder::hash_decoder`], but hashing on the calling thread.
    ///
    /// # Errors
    /// Returns `Err` if a frame cannot be hashed.
    pub fn hash_decoder_sequential<D>(
        &self,
        decoder: D,
        cancel: &CancelToken,
    ) -> Result<HashOutcome, HashCreationErrorKind>
    where
        D: FrameDecoder,
    {
        let duration = decoder.duration();
        let mut sampler = FrameSampler::with_cancel(decoder, self.options.seconds_per_hash, cancel.clone());

        let features = (&mut sampler)
            .filter_map(Result::ok)
            .map(|frame| hash_frame(&frame))
            .collect::<Result<Vec<_>, _>>()?;

        self.finish(sampler, features, duration)
    }

    /// Fingerprint a video file using ffmpeg.
    ///
    /// # Errors
    /// Returns `Err` if the video cannot be opened or a frame cannot be hashed.
    #[cfg(feature = "ffmpeg_backend")]
    pub fn hash_path(
        &self,
        src_path: impl AsRef<std::path::Path>,
        cancel: &CancelToken,
    ) -> Result<HashOutcome, HashCreationErrorKind> {
        let src_path = src_path.as_ref();
        let decoder = crate::FfmpegDecoder::open(
            src_path,
            self.options.max_decode_dimension,
            self.options.decode_timeout_secs,
        )
        .map_err(|error| HashCreationErrorKind::Open {
            src_path: src_path.to_path_buf(),
            error,
        })?;

        info!(target: "hash_creation", "hashing {}", src_path.display());
        self.hash_decoder(decoder, cancel)
    }

    fn finish<D: FrameDecoder>(
        &self,
        sampler: FrameSampler<D>,
        features: Vec<VpdqFeature>,
        duration: Option<f64>,
    ) -> Result<HashOutcome, HashCreationErrorKind> {
        let completion = sampler.completion().cloned().unwrap_or(Completion::Complete);
        let frames_decoded = sampler.frames_decoded();

        let duration = duration
            .or_else(|| features.iter().map(|f| f.timestamp).reduce(f64::max))
            .unwrap_or(0.0);

        //frame numbers are unique and timestamps were checked by the sampler, so only the
        //order can be wrong here.
        let sequence = FeatureSequence::from_unordered(features, self.options.seconds_per_hash, duration)
            .expect("unreachable");

        debug!(
            target: "hash_creation",
            "{} features from {frames_decoded} decoded frames ({completion:?})",
            sequence.len()
        );

        Ok(HashOutcome {
            sequence,
            completion,
            frames_decoded,
        })
    }
}

/// Hash a single sampled frame.
///
/// # Errors
/// Returns `Err` if the frame is too small to hash.
pub fn hash_frame(frame: &Frame) -> Result<VpdqFeature, HashCreationErrorKind> {
    let frame_hash = hash_image(&frame.image).map_err(|error| HashCreationErrorKind::Hash {
        frame_number: frame.frame_number,
        error,
    })?;

    trace!(
        target: "hash_creation",
        "frame {} at {:.3}s: {} quality {}",
        frame.frame_number,
        frame.timestamp,
        frame_hash.hash,
        frame_hash.quality()
    );

    Ok(VpdqFeature {
        frame_number: frame.frame_number,
        timestamp: frame.timestamp,
        hash: frame_hash.hash,
        quality: frame_hash.quality(),
    })
}

/// Fingerprint many videos concurrently.
///
/// At most `max_concurrent_videos` decoders are open at the same time. `open` is called once
/// for each source on a worker thread. Results are returned in the order of `sources`.
pub fn hash_videos<S, D, F>(
    builder: &VpdqHashBuilder,
    sources: &[S],
    open: F,
    cancel: &CancelToken,
) -> Vec<Result<HashOutcome, HashCreationErrorKind>>
where
    S: Sync,
    D: FrameDecoder + Send,
    F: Fn(&S) -> Result<D, HashCreationErrorKind> + Sync,
{
    let video_pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(builder.options.max_concurrent_videos)
        .thread_name(|i| format!("vpdq-video-{i}"))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = HashCreationErrorKind::ThreadPool(e.to_string());
            return sources.iter().map(|_| Err(err.clone())).collect();
        }
    };

    video_pool.install(|| {
        sources
            .par_iter()
            .map(|source| {
                let decoder = open(source)?;
                builder.hash_decoder(decoder, cancel)
            })
            .collect()
    })
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;
    use crate::test_util::{flat_image, textured_image};
    use crate::{DecodeError, HashError, VecDecoder};

    fn builder(seconds_per_hash: f64, hash_threads: usize) -> VpdqHashBuilder {
        VpdqHashBuilder::from_options(CreationOptions {
            seconds_per_hash,
            hash_threads,
            ..CreationOptions::default()
        })
        .unwrap()
    }

    fn textured_decoder(num_frames: usize, fps: f64, seed: u64) -> VecDecoder {
        let mut rng = StdRng::seed_from_u64(seed);
        let images = (0..num_frames)
            .map(|_| textured_image(96, 64, &mut rng))
            .collect();
        VecDecoder::from_images(images, fps)
    }

    #[test]
    fn test_options_are_validated() {
        let bad = [
            CreationOptions {
                seconds_per_hash: -1.0,
                ..CreationOptions::default()
            },
            CreationOptions {
                seconds_per_hash: f64::NAN,
                ..CreationOptions::default()
            },
            CreationOptions {
                hash_threads: 0,
                ..CreationOptions::default()
            },
            CreationOptions {
                max_concurrent_videos: 0,
                ..CreationOptions::default()
            },
        ];
        for opts in bad {
            assert!(matches!(
                VpdqHashBuilder::from_options(opts),
                Err(HashCreationErrorKind::Config(_))
            ));
        }
    }

    #[test]
    fn test_parallel_equals_sequential() {
        let parallel = builder(0.5, 4)
            .hash_decoder(textured_decoder(40, 10.0, 1), &CancelToken::new())
            .unwrap();
        let sequential = builder(0.5, 1)
            .hash_decoder_sequential(textured_decoder(40, 10.0, 1), &CancelToken::new())
            .unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel.sequence.len(), 8);
        assert_eq!(parallel.frames_decoded, 40);
        assert_eq!(parallel.completion, Completion::Complete);

        let numbers = parallel.sequence.iter().map(|f| f.frame_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![0, 5, 10, 15, 20, 25, 30, 35]);
    }

    #[test]
    fn test_incomplete_decode_keeps_partial_sequence() {
        let err = DecodeError::new("bitstream error");
        let decoder = textured_decoder(50, 10.0, 2).failing_at(25, err.clone());
        let outcome = builder(1.0, 2).hash_decoder(decoder, &CancelToken::new()).unwrap();

        assert_eq!(outcome.completion, Completion::Incomplete(err));
        let numbers = outcome.sequence.iter().map(|f| f.frame_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![0, 10, 20]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = builder(1.0, 2).hash_decoder(textured_decoder(20, 10.0, 3), &cancel).unwrap();
        assert_eq!(outcome.completion, Completion::Cancelled);
        assert!(outcome.sequence.is_empty());
    }

    #[test]
    fn test_empty_video() {
        let outcome = builder(1.0, 2)
            .hash_decoder(VecDecoder::from_images(vec![], 25.0), &CancelToken::new())
            .unwrap();
        assert!(outcome.sequence.is_empty());
        assert_eq!(outcome.completion, Completion::Complete);
    }

    #[test]
    fn test_frame_too_small() {
        let decoder = VecDecoder::from_images(vec![flat_image(3, 3, 0)], 25.0);
        let res = builder(1.0, 1).hash_decoder(decoder, &CancelToken::new());
        assert!(matches!(
            res,
            Err(HashCreationErrorKind::Hash {
                frame_number: 0,
                error: HashError::FrameTooSmall { .. }
            })
        ));
    }

    #[test]
    fn test_hash_many_videos() {
        let b = VpdqHashBuilder::from_options(CreationOptions {
            seconds_per_hash: 1.0,
            hash_threads: 2,
            max_concurrent_videos: 2,
            ..CreationOptions::default()
        })
        .unwrap();

        let seeds = [10u64, 11, 12];
        let results = hash_videos(
            &b,
            &seeds,
            |seed| Ok(textured_decoder(30, 10.0, *seed)),
            &CancelToken::new(),
        );

        assert_eq!(results.len(), 3);
        for (seed, res) in seeds.iter().zip(results) {
            let outcome = res.unwrap();
            let alone = b
                .hash_decoder_sequential(textured_decoder(30, 10.0, *seed), &CancelToken::new())
                .unwrap();
            assert_eq!(outcome, alone);
            assert_eq!(outcome.sequence.len(), 3);
        }
    }
}
