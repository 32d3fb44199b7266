use bitvec::prelude::*;
use image::DynamicImage;

use crate::definitions::{HASH_WORDS, MIN_HASHABLE_DIM};
use crate::utils::{dct_ops, luma::LumaBuf};
use crate::video_hashing::quality::quality_from_energy;
use crate::{Hash256, HashError};

/// The perceptual hash of one frame together with the energy of the coefficients it was
/// built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHash {
    pub hash: Hash256,
    pub energy: f64,
}

impl FrameHash {
    /// The quality score of the frame, in `0..=100`.
    #[must_use]
    pub fn quality(&self) -> f64 {
        quality_from_energy(self.energy)
    }
}

/// Compute the perceptual hash of an image.
///
/// The image is converted to luma, low-pass filtered and decimated to 64x64, and transformed
/// with a 2D DCT-II. The 16x16 lowest non-DC frequencies are compared against their median
/// to produce the 256 hash bits. The same pixels always produce the same hash.
///
/// # Errors
/// Returns `Err` if the image is smaller than 5 pixels in either direction.
pub fn hash_image(image: &DynamicImage) -> Result<FrameHash, HashError> {
    let (width, height) = (image.width(), image.height());
    if width < MIN_HASHABLE_DIM || height < MIN_HASHABLE_DIM {
        return Err(HashError::FrameTooSmall { width, height });
    }

    let grid = LumaBuf::from_image(image).downsample().into_raw();
    let dct = dct_ops::perform_dct(grid);
    let coefficients = dct_ops::lowest_frequencies(&dct);

    let median = dct_ops::median(&coefficients);

    // Pack the raw bits of the hash into a bit vector.
    let mut bitarr: BitArray<[u64; HASH_WORDS], Lsb0> = BitArray::ZERO;
    assert!(bitarr.len() >= coefficients.len());
    for (mut bit, coefficient) in bitarr.iter_mut().zip(coefficients.iter()) {
        *bit = *coefficient >= median;
    }

    Ok(FrameHash {
        hash: Hash256::from_bitarray(bitarr),
        energy: dct_ops::std_dev(&coefficients),
    })
}
