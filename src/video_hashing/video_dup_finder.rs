use crate::*;

use super::matcher;

/// Compare a query fingerprint against a reference fingerprint.
///
/// Frames below the configured quality are ignored. The remaining frames are aligned in
/// order, best matches first, and runs of consecutive matching frames become segments. The
/// result does not depend on which video is the query: swapping the arguments gives
/// [`MatchResult::swapped`].
///
/// ```
/// use vpdq_lib::{match_sequences, MatchConfig};
/// # use rand::SeedableRng;
/// # let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// # let video = vpdq_lib::test_util::random_sequence(10, &mut rng);
///
/// let res = match_sequences(&video, &video, &MatchConfig::default());
/// assert_eq!(res.score, 1.0);
/// assert_eq!(res.segments.len(), 1);
/// ```
pub fn match_sequences(query: &FeatureSequence, reference: &FeatureSequence, cfg: &MatchConfig) -> MatchResult {
    matcher::align(query, reference, cfg)
}

/// Compare two fingerprints position by position: feature `i` of the query with feature `i`
/// of the reference. Positions where either frame is below the configured quality are
/// skipped. The run length setting is not used.
///
/// # Errors
/// Returns `Err` if the sequences have different lengths.
pub fn match_by_line(
    query: &FeatureSequence,
    reference: &FeatureSequence,
    cfg: &MatchConfig,
) -> Result<LineMatch, LengthMismatch> {
    if query.len() != reference.len() {
        return Err(LengthMismatch {
            query: query.len(),
            reference: reference.len(),
        });
    }

    let mut ret = LineMatch::default();
    for (q, r) in query.iter().zip(reference) {
        if q.quality < cfg.min_quality() || r.quality < cfg.min_quality() {
            continue;
        }
        ret.compared += 1;
        if cfg.within_threshold(q.hamming_distance(r)) {
            ret.matched += 1;
        }
    }

    debug!(target: "matcher", "line by line: {} of {} positions match", ret.matched, ret.compared);
    Ok(ret)
}
