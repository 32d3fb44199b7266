//Utilities for testing. Always compiled so that integration tests and downstream crates can
//build synthetic fingerprints.

use image::{DynamicImage, GrayImage, RgbImage};
use rand::prelude::*;

use crate::definitions::{HASH_BITS, HASH_WORDS};
use crate::{FeatureSequence, Hash256, VpdqFeature};

pub fn empty_hash() -> Hash256 {
    Hash256::default()
}

pub fn full_hash() -> Hash256 {
    Hash256::from_words([u64::MAX; HASH_WORDS])
}

pub fn random_hash(rng: &mut StdRng) -> Hash256 {
    Hash256::from_bits((0..HASH_BITS).map(|_| rng.gen_bool(0.5)))
}

/// A hash exactly `target_distance` bits away from `hash`.
pub fn hash_with_distance(hash: &Hash256, target_distance: u32, rng: &mut StdRng) -> Hash256 {
    assert!(target_distance <= HASH_BITS);

    let mut flipped = vec![false; HASH_BITS as usize];
    for idx in rand::seq::index::sample(rng, HASH_BITS as usize, target_distance as usize) {
        flipped[idx] = true;
    }

    let ret = Hash256::from_bits(hash.bits().zip(flipped).map(|(bit, flip)| bit ^ flip));
    assert_eq!(hash.hamming_distance(&ret), target_distance);
    ret
}

/// A sequence sampled once per second, with the given hashes at the given quality.
pub fn sequence_from_hashes(hashes: &[Hash256], quality: f64) -> FeatureSequence {
    let features = hashes
        .iter()
        .enumerate()
        .map(|(i, hash)| VpdqFeature {
            frame_number: i as u64,
            timestamp: i as f64,
            hash: *hash,
            quality,
        })
        .collect();

    FeatureSequence::new(features, 1.0, hashes.len() as f64).expect("unreachable")
}

/// A sequence of `len` unrelated random hashes at full quality.
pub fn random_sequence(len: usize, rng: &mut StdRng) -> FeatureSequence {
    let hashes = (0..len).map(|_| random_hash(rng)).collect::<Vec<_>>();
    sequence_from_hashes(&hashes, 100.0)
}

/// A grayscale image made of an 8x8 grid of random intensity blocks. Has plenty of low
/// frequency detail, so it hashes with high quality.
pub fn textured_image(width: u32, height: u32, rng: &mut StdRng) -> DynamicImage {
    let blocks: Vec<u8> = (0..64).map(|_| rng.gen()).collect();
    let img = GrayImage::from_fn(width, height, |x, y| {
        let bx = (x * 8 / width) as usize;
        let by = (y * 8 / height) as usize;
        image::Luma([blocks[by * 8 + bx]])
    });
    DynamicImage::ImageLuma8(img)
}

pub fn flat_image(width: u32, height: u32, value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([value; 3])))
}
