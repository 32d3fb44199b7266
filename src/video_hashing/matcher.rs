use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::{FeatureSequence, Hash256, MatchConfig, MatchResult, MatchedPair, MatchedSegment, VpdqFeature};

// A pair of eligible frames within the distance threshold. `p` and `q` are ordinals among the
// eligible frames of the query and reference. There can be |query| x |reference| of these, so
// the sort key is derived on demand rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    p: usize,
    q: usize,
    distance: u32,
}

type SortKey = (u32, usize, usize, Hash256, Hash256);

// The eligible frames on each side.
struct Sides<'a> {
    query: &'a [&'a VpdqFeature],
    reference: &'a [&'a VpdqFeature],
}

impl Sides<'_> {
    //every component is unchanged when query and reference trade places.
    fn key(&self, c: &Candidate) -> SortKey {
        let query_hash = self.query[c.p].hash;
        let reference_hash = self.reference[c.q].hash;
        (
            c.distance,
            c.p + c.q,
            c.p.abs_diff(c.q),
            query_hash.min(reference_hash),
            query_hash.max(reference_hash),
        )
    }
}

// Accepted pairs, increasing on both sides.
#[derive(Debug, Default)]
struct Chain {
    by_query: BTreeMap<usize, usize>,
    used_reference: Vec<bool>,
}

impl Chain {
    fn with_reference_len(len: usize) -> Self {
        Self {
            by_query: BTreeMap::new(),
            used_reference: vec![false; len],
        }
    }

    // A pair can join the chain if neither frame is taken and the chain stays increasing.
    fn is_viable(&self, p: usize, q: usize) -> bool {
        if self.by_query.contains_key(&p) || self.used_reference[q] {
            return false;
        }

        let before_ok = self.by_query.range(..p).next_back().map_or(true, |(_, &prev_q)| prev_q < q);
        let after_ok = self.by_query.range(p + 1..).next().map_or(true, |(_, &next_q)| next_q > q);
        before_ok && after_ok
    }

    fn insert(&mut self, p: usize, q: usize) {
        self.by_query.insert(p, q);
        self.used_reference[q] = true;
    }
}

/// Align the eligible frames of two fingerprints and measure how much of each is covered.
pub(crate) fn align(query: &FeatureSequence, reference: &FeatureSequence, cfg: &MatchConfig) -> MatchResult {
    let query_frames = query.eligible(cfg.min_quality()).collect::<Vec<_>>();
    let reference_frames = reference.eligible(cfg.min_quality()).collect::<Vec<_>>();

    let sides = Sides {
        query: &query_frames,
        reference: &reference_frames,
    };

    let mut candidates = candidates(&query_frames, &reference_frames, cfg);
    candidates.par_sort_unstable_by(|a, b| sides.key(a).cmp(&sides.key(b)).then((a.p, a.q).cmp(&(b.p, b.q))));

    let chain = accept(&candidates, &sides);

    let accepted = candidates_in_chain(&chain, &candidates);
    let runs = contiguous_runs(&accepted);

    let mut pairs = vec![];
    let mut segments = vec![];
    for run in runs.iter().filter(|run| run.len() >= cfg.min_match_run_length()) {
        let run_pairs = run
            .iter()
            .map(|c| MatchedPair {
                query: *query_frames[c.p],
                reference: *reference_frames[c.q],
                distance: c.distance,
            })
            .collect::<Vec<_>>();
        segments.extend(MatchedSegment::from_pairs(&run_pairs));
        pairs.extend(run_pairs);
    }

    let score = coverage(pairs.len(), query_frames.len());
    let reference_score = coverage(pairs.len(), reference_frames.len());

    debug!(
        target: "matcher",
        "{} candidates, {} accepted, {} segments ({} frames), score {score:.3}/{reference_score:.3}",
        candidates.len(),
        accepted.len(),
        segments.len(),
        pairs.len()
    );

    MatchResult {
        pairs,
        segments,
        score,
        reference_score,
        eligible_query: query_frames.len(),
        eligible_reference: reference_frames.len(),
    }
}

fn candidates(query_frames: &[&VpdqFeature], reference_frames: &[&VpdqFeature], cfg: &MatchConfig) -> Vec<Candidate> {
    query_frames
        .par_iter()
        .enumerate()
        .flat_map_iter(|(p, query_frame)| {
            reference_frames.iter().enumerate().filter_map(move |(q, reference_frame)| {
                let distance = query_frame.hamming_distance(reference_frame);
                cfg.within_threshold(distance)
                    .then_some(Candidate { p, q, distance })
            })
        })
        .collect()
}

// Walk the sorted candidates one group of equal keys at a time. A group holds either a single
// candidate or a pair of mirror images (p, q) and (q, p), which always cross each other, so
// accepting either would depend on which side is the query.
fn accept(sorted: &[Candidate], sides: &Sides) -> Chain {
    let mut chain = Chain::with_reference_len(sides.reference.len());

    let mut start = 0;
    while start < sorted.len() {
        let key = sides.key(&sorted[start]);
        let end = start + sorted[start..].iter().take_while(|c| sides.key(c) == key).count();

        let viable = sorted[start..end]
            .iter()
            .filter(|c| chain.is_viable(c.p, c.q))
            .collect::<Vec<_>>();

        if let [only] = viable.as_slice() {
            chain.insert(only.p, only.q);
        } else if viable.len() > 1 {
            trace!(target: "matcher", "skipping ambiguous mirror pair at distance {}", key.0);
        }

        start = end;
    }

    chain
}

fn candidates_in_chain(chain: &Chain, sorted: &[Candidate]) -> Vec<Candidate> {
    let mut accepted = sorted
        .iter()
        .filter(|c| chain.by_query.get(&c.p) == Some(&c.q))
        .copied()
        .collect::<Vec<_>>();
    accepted.sort_by_key(|c| c.p);
    accepted
}

// Split an increasing chain into runs where both ordinals advance by exactly one.
fn contiguous_runs(accepted: &[Candidate]) -> Vec<&[Candidate]> {
    let mut runs = vec![];
    let mut start = 0;
    for i in 1..=accepted.len() {
        let continues = accepted
            .get(i)
            .is_some_and(|c| c.p == accepted[i - 1].p + 1 && c.q == accepted[i - 1].q + 1);
        if !continues {
            runs.push(&accepted[start..i]);
            start = i;
        }
    }
    runs
}

fn coverage(matched: usize, eligible: usize) -> f64 {
    if eligible == 0 {
        0.0
    } else {
        matched as f64 / eligible as f64
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;
    use crate::test_util::{hash_with_distance, random_hash, sequence_from_hashes};

    fn cfg(threshold: u32, run: usize) -> MatchConfig {
        MatchConfig::new(threshold, 0.0, run).unwrap()
    }

    #[test]
    fn test_chain_rejects_crossing_and_shared_frames() {
        let mut chain = Chain::with_reference_len(10);
        chain.insert(2, 5);
        chain.insert(6, 7);

        assert!(chain.is_viable(4, 6));
        assert!(chain.is_viable(0, 0));
        assert!(chain.is_viable(8, 9));

        assert!(!chain.is_viable(2, 6)); //query frame taken
        assert!(!chain.is_viable(3, 5)); //reference frame taken
        assert!(!chain.is_viable(4, 3)); //crosses (2, 5)
        assert!(!chain.is_viable(7, 6)); //crosses (6, 7)
        assert!(!chain.is_viable(1, 8));
    }

    #[test]
    fn test_contiguous_runs() {
        let c = |p, q| Candidate { p, q, distance: 0 };
        let accepted = [c(0, 3), c(1, 4), c(2, 5), c(4, 7), c(6, 8), c(7, 9)];
        let lens = contiguous_runs(&accepted).iter().map(|r| r.len()).collect::<Vec<_>>();
        assert_eq!(lens, vec![3, 1, 2]);
        assert!(contiguous_runs(&[]).is_empty());
    }

    #[test]
    fn test_mirror_pair_is_ambiguous() {
        //identical hashes everywhere, so (1, 2) and (2, 1) have the same key.
        let seq = sequence_from_hashes(&[Hash256::default(); 3], 100.0);
        let frames = seq.iter().collect::<Vec<_>>();
        let sides = Sides {
            query: &frames,
            reference: &frames,
        };

        let mirror = [Candidate { p: 1, q: 2, distance: 0 }, Candidate { p: 2, q: 1, distance: 0 }];
        assert_eq!(sides.key(&mirror[0]), sides.key(&mirror[1]));
        assert!(accept(&mirror, &sides).by_query.is_empty());

        //once one side is blocked, the other is accepted.
        let mut blocked = mirror.to_vec();
        blocked.insert(0, Candidate { p: 0, q: 1, distance: 0 });
        let chain = accept(&blocked, &sides);
        assert_eq!(chain.by_query.into_iter().collect::<Vec<_>>(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_candidates_stay_small() {
        //a static scene produces a candidate for nearly every pair of frames.
        assert!(std::mem::size_of::<Candidate>() <= 3 * std::mem::size_of::<usize>());

        let frames = sequence_from_hashes(&[Hash256::default(); 40], 100.0);
        let res = align(&frames, &frames, &cfg(0, 1));
        assert_eq!(res.pairs.len(), 40);
        assert_eq!(res.segments.len(), 1);
        assert!(res.pairs.iter().all(|pair| pair.query.frame_number == pair.reference.frame_number));
    }

    #[test]
    fn test_swapping_sides_swaps_result() {
        //few distinct hashes, so many candidates tie on distance.
        let mut rng = StdRng::seed_from_u64(3);
        let alphabet = (0..3).map(|_| random_hash(&mut rng)).collect::<Vec<_>>();
        for _ in 0..20 {
            let mut pick = |len| {
                (0..len)
                    .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                    .collect::<Vec<_>>()
            };
            let query = sequence_from_hashes(&pick(12), 100.0);
            let reference = sequence_from_hashes(&pick(9), 100.0);

            let forward = align(&query, &reference, &cfg(0, 1));
            let backward = align(&reference, &query, &cfg(0, 1));
            assert_eq!(forward.swapped(), backward);
        }
    }

    #[test]
    fn test_best_distance_wins() {
        //query frame 0 is close to both reference frames, but closer to frame 1.
        let mut rng = StdRng::seed_from_u64(4);
        let base = random_hash(&mut rng);
        let near = hash_with_distance(&base, 2, &mut rng);
        let nearer = hash_with_distance(&base, 1, &mut rng);

        let query = sequence_from_hashes(&[base], 100.0);
        let reference = sequence_from_hashes(&[near, nearer], 100.0);

        let res = align(&query, &reference, &cfg(5, 1));
        assert_eq!(res.pairs.len(), 1);
        assert_eq!(res.pairs[0].reference.frame_number, 1);
        assert_eq!(res.pairs[0].distance, 1);
        assert_eq!(res.score, 1.0);
        assert_eq!(res.reference_score, 0.5);
    }

    #[test]
    fn test_runs_shorter_than_minimum_are_dropped() {
        let mut rng = StdRng::seed_from_u64(5);
        let hashes = (0..6).map(|_| random_hash(&mut rng)).collect::<Vec<_>>();
        let query = sequence_from_hashes(&hashes, 100.0);

        //reference keeps frames 0..3 and 4, with an unrelated frame between them.
        let unrelated = random_hash(&mut rng);
        let reference = sequence_from_hashes(&[hashes[0], hashes[1], hashes[2], unrelated, unrelated, hashes[4]], 100.0);

        let all = align(&query, &reference, &cfg(10, 1));
        assert_eq!(all.segments.len(), 2);
        assert_eq!(all.pairs.len(), 4);

        let long_only = align(&query, &reference, &cfg(10, 2));
        assert_eq!(long_only.segments.len(), 1);
        assert_eq!(long_only.segments[0].len, 3);
        assert_eq!(long_only.score, 0.5);
    }
}
