pub mod codec;
pub mod distance;
pub mod errors;
pub mod feature;
pub mod frame_sampler;
pub mod hash256;
pub mod matches;
mod matcher;
pub mod quality;
pub mod search;
pub mod video_dup_finder;
pub mod video_hash_builder;

#[cfg(feature = "ffmpeg_backend")]
pub mod ffmpeg_decoder;

pub mod test_util;
