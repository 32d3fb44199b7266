use rustdct::DctPlanner;
use transpose::transpose_inplace;

use crate::definitions::{DOWNSAMPLE_DIM, HASH_DIM};

pub const NUM_HASH_COEFFICIENTS: usize = HASH_DIM * HASH_DIM;

/// Two dimensional DCT-II of a square, row-major matrix. The output is unnormalized and is laid
/// out as `[vertical_frequency][horizontal_frequency]`.
pub fn perform_dct(mut raw_values: Vec<f64>) -> Vec<f64> {
    let dimension = (raw_values.len() as f64).sqrt() as usize;
    assert!(
        dimension * dimension == raw_values.len(),
        "matrix must be square, got {} elements",
        raw_values.len()
    );

    //setup the DCT. For power-of-two lengths rustdct plans a scalar split-radix algorithm,
    //so the output does not depend on which cpu features are available at runtime.
    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(dimension);

    //perform round 1 of the DCT (on rows):
    raw_values.chunks_exact_mut(dimension).for_each(|row| {
        dct.process_dct2(row);
    });

    //now tranpose...
    let mut scratch = vec![0f64; dimension];
    transpose_inplace(&mut raw_values, &mut scratch, dimension, dimension);

    //perform round 2 of the DCT (on cols):
    raw_values.chunks_exact_mut(dimension).for_each(|col| {
        dct.process_dct2(col);
    });

    //and transpose back so that rows are vertical frequencies again.
    transpose_inplace(&mut raw_values, &mut scratch, dimension, dimension);

    raw_values
}

/// Take the HASH_DIM x HASH_DIM lowest frequency bins of a DOWNSAMPLE_DIM-square DCT, skipping
/// the zero-frequency row and column. The values are scaled to the orthonormal DCT so that
/// their magnitude is comparable to pixel intensities.
pub fn lowest_frequencies(dct: &[f64]) -> [f64; NUM_HASH_COEFFICIENTS] {
    assert_eq!(dct.len(), DOWNSAMPLE_DIM * DOWNSAMPLE_DIM);

    // sqrt(2/N) per axis.
    let scale = 2.0 / DOWNSAMPLE_DIM as f64;

    let mut ret = [0f64; NUM_HASH_COEFFICIENTS];
    let rows = dct.chunks_exact(DOWNSAMPLE_DIM).skip(1).take(HASH_DIM);
    for (dest_row, src_row) in ret.chunks_exact_mut(HASH_DIM).zip(rows) {
        for (dest, src) in dest_row.iter_mut().zip(&src_row[1..=HASH_DIM]) {
            *dest = src * scale;
        }
    }

    ret
}

/// The median of the given values. For an even number of values this is the mean of the two
/// middle values.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
