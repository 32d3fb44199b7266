use crate::definitions::{MAX_QUALITY, QUALITY_PER_ENERGY};

/// Convert the raw energy of a frame's hash coefficients into a quality score in `0..=100`.
///
/// Energy is the standard deviation of the orthonormal DCT coefficients used to build the hash.
/// Frames without detail (blank, flat, heavily blurred) have almost no energy, and their hash
/// bits are dominated by noise, so they score close to 0.
#[must_use]
pub fn quality_from_energy(energy: f64) -> f64 {
    if !energy.is_finite() {
        return 0.0;
    }
    (energy * QUALITY_PER_ENERGY).round().clamp(0.0, MAX_QUALITY)
}
