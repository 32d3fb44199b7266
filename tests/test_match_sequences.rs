use itertools::Itertools;
use rand::prelude::*;
use vpdq_lib::test_util::{hash_with_distance, random_hash, random_sequence, sequence_from_hashes};
use vpdq_lib::*;

fn hashes(seq: &FeatureSequence) -> Vec<Hash256> {
    seq.iter().map(|f| f.hash).collect()
}

fn with_qualities(hashes: &[Hash256], qualities: &[f64]) -> FeatureSequence {
    let features = hashes
        .iter()
        .zip(qualities)
        .enumerate()
        .map(|(i, (hash, quality))| VpdqFeature {
            frame_number: i as u64,
            timestamp: i as f64,
            hash: *hash,
            quality: *quality,
        })
        .collect();
    FeatureSequence::new(features, 1.0, hashes.len() as f64).unwrap()
}

fn cfg(threshold: u32, min_quality: f64, run: usize) -> MatchConfig {
    MatchConfig::new(threshold, min_quality, run).unwrap()
}

fn assert_increasing(res: &MatchResult) {
    assert!(res.pairs.iter().tuple_windows().all(|(a, b)| {
        a.query.frame_number < b.query.frame_number && a.reference.frame_number < b.reference.frame_number
    }));
}

#[test]
fn test_self_match() {
    let mut rng = StdRng::seed_from_u64(1);
    let seq = random_sequence(30, &mut rng);

    let res = match_sequences(&seq, &seq, &MatchConfig::default());
    assert_eq!(res.score, 1.0);
    assert_eq!(res.reference_score, 1.0);
    assert_eq!(res.segments.len(), 1);
    assert_eq!(res.pairs.len(), 30);
    assert!(res.pairs.iter().all(|p| p.distance == 0 && p.query == p.reference));

    let seg = res.segments[0];
    assert_eq!((seg.query_start_frame, seg.query_end_frame), (0, 29));
    assert_eq!((seg.reference_start_frame, seg.reference_end_frame), (0, 29));
    assert_eq!(seg.time_offset(), 0.0);
}

#[test]
fn test_single_bit_perturbation() {
    let mut rng = StdRng::seed_from_u64(2);
    let query = random_sequence(30, &mut rng);
    let mut perturbed = hashes(&query);
    perturbed[5] = hash_with_distance(&perturbed[5], 1, &mut rng);
    let reference = sequence_from_hashes(&perturbed, 100.0);

    let loose = match_sequences(&query, &reference, &cfg(1, 50.0, 1));
    assert_eq!(loose.score, 1.0);
    assert_eq!(loose.segments.len(), 1);
    assert_eq!(loose.pairs[5].distance, 1);

    let exact = match_sequences(&query, &reference, &cfg(0, 50.0, 1));
    assert_eq!(exact.pairs.len(), 29);
    assert_eq!(exact.score, 29.0 / 30.0);
    let bounds = exact
        .segments
        .iter()
        .map(|s| (s.query_start_frame, s.query_end_frame))
        .collect::<Vec<_>>();
    assert_eq!(bounds, vec![(0, 4), (6, 29)]);
}

#[test]
fn test_empty_sequences() {
    let mut rng = StdRng::seed_from_u64(3);
    let seq = random_sequence(10, &mut rng);
    let empty = FeatureSequence::default();

    for (q, r) in [(&empty, &seq), (&seq, &empty), (&empty, &empty)] {
        let res = match_sequences(q, r, &MatchConfig::default());
        assert_eq!(res.score, 0.0);
        assert_eq!(res.reference_score, 0.0);
        assert!(res.segments.is_empty());
        assert!(!res.is_match());
    }
}

#[test]
fn test_low_quality_frames_are_ignored() {
    let mut rng = StdRng::seed_from_u64(4);
    let seq = random_sequence(10, &mut rng);
    let hs = hashes(&seq);

    //everything below the default minimum quality.
    let dull = with_qualities(&hs, &[40.0; 10]);
    let res = match_sequences(&dull, &seq, &MatchConfig::default());
    assert_eq!(res.eligible_query, 0);
    assert_eq!(res.score, 0.0);
    assert!(res.segments.is_empty());

    //frames 3 and 7 are unusable.
    let mut qualities = [100.0; 10];
    qualities[3] = 10.0;
    qualities[7] = 10.0;
    let gappy = with_qualities(&hs, &qualities);

    let res = match_sequences(&gappy, &seq, &MatchConfig::default());
    assert_eq!(res.eligible_query, 8);
    assert_eq!(res.eligible_reference, 10);
    assert_eq!(res.score, 1.0);
    assert_eq!(res.reference_score, 0.8);
    assert!(res.pairs.iter().all(|p| p.query.frame_number == p.reference.frame_number));
    assert_eq!(res.segments.iter().map(|s| s.len).collect::<Vec<_>>(), vec![3, 3, 2]);

    //with quality gating switched off, every frame counts.
    let res = match_sequences(&gappy, &seq, &cfg(31, 0.0, 1));
    assert_eq!(res.pairs.len(), 10);
    assert_eq!(res.segments.len(), 1);
}

#[test]
fn test_swapping_query_and_reference() {
    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let query = random_sequence(25, &mut rng);

        //noisy copies of random parts of the query, mixed with unrelated frames.
        let mut reference_hashes = vec![];
        for h in hashes(&query) {
            if rng.gen_bool(0.3) {
                continue;
            }
            let distance = rng.gen_range(0..40);
            reference_hashes.push(hash_with_distance(&h, distance, &mut rng));
            if rng.gen_bool(0.3) {
                reference_hashes.push(random_hash(&mut rng));
            }
        }
        let reference = sequence_from_hashes(&reference_hashes, 100.0);

        let forward = match_sequences(&query, &reference, &MatchConfig::default());
        let backward = match_sequences(&reference, &query, &MatchConfig::default());

        assert_eq!(forward.swapped(), backward);
        assert_eq!(forward.score, backward.reference_score);
        assert_increasing(&forward);
    }
}

#[test]
fn test_time_shifted_copy() {
    let mut rng = StdRng::seed_from_u64(5);
    let query = random_sequence(20, &mut rng);

    let mut shifted = (0..7).map(|_| random_hash(&mut rng)).collect::<Vec<_>>();
    shifted.extend(hashes(&query));
    let reference = sequence_from_hashes(&shifted, 100.0);

    let res = match_sequences(&query, &reference, &MatchConfig::default());
    assert_eq!(res.score, 1.0);
    assert_eq!(res.reference_score, 20.0 / 27.0);
    assert_eq!(res.segments.len(), 1);

    let seg = res.segments[0];
    assert_eq!(seg.reference_start_frame, 7);
    assert_eq!(seg.reference_end_frame, 26);
    assert_eq!(seg.time_offset(), 7.0);
}

#[test]
fn test_noisy_copy_matches_within_threshold() {
    let mut rng = StdRng::seed_from_u64(6);
    let query = random_sequence(15, &mut rng);
    let noisy = hashes(&query)
        .iter()
        .map(|h| hash_with_distance(h, 20, &mut rng))
        .collect::<Vec<_>>();
    let reference = sequence_from_hashes(&noisy, 100.0);

    let res = match_sequences(&query, &reference, &MatchConfig::default());
    assert_eq!(res.score, 1.0);
    assert!(res.pairs.iter().all(|p| p.distance == 20));

    let strict = match_sequences(&query, &reference, &cfg(19, 50.0, 1));
    assert_eq!(strict.score, 0.0);
}

#[test]
fn test_short_runs_are_discarded() {
    let mut rng = StdRng::seed_from_u64(7);
    let query = random_sequence(20, &mut rng);
    let hs = hashes(&query);

    //runs of 3, 2 and 10 frames, separated by unrelated frames.
    let mut reference = vec![];
    reference.extend_from_slice(&hs[0..3]);
    reference.push(random_hash(&mut rng));
    reference.extend_from_slice(&hs[5..7]);
    reference.push(random_hash(&mut rng));
    reference.extend_from_slice(&hs[10..20]);
    let reference = sequence_from_hashes(&reference, 100.0);

    let lens = |run| {
        match_sequences(&query, &reference, &cfg(31, 50.0, run))
            .segments
            .iter()
            .map(|s| s.len)
            .collect::<Vec<_>>()
    };

    assert_eq!(lens(1), vec![3, 2, 10]);
    assert_eq!(lens(3), vec![3, 10]);
    assert_eq!(lens(4), vec![10]);
    assert!(lens(11).is_empty());

    let res = match_sequences(&query, &reference, &cfg(31, 50.0, 3));
    assert_eq!(res.score, 13.0 / 20.0);
}

#[test]
fn test_fingerprint_file_round_trip_matches_the_same() {
    let mut rng = StdRng::seed_from_u64(8);
    let query = random_sequence(12, &mut rng);
    let reference = random_sequence(12, &mut rng);

    let reloaded = codec::decode(&codec::encode(&query)).unwrap();
    assert_eq!(hashes(&reloaded), hashes(&query));

    let cfg = MatchConfig::default();
    assert_eq!(match_sequences(&reloaded, &query, &cfg).score, 1.0);
    assert_eq!(
        match_sequences(&reloaded, &reference, &cfg).pairs.len(),
        match_sequences(&query, &reference, &cfg).pairs.len()
    );
}

#[test]
fn test_line_by_line() {
    let mut rng = StdRng::seed_from_u64(9);
    let query = random_sequence(8, &mut rng);
    let same = sequence_from_hashes(&hashes(&query), 100.0);

    let res = match_by_line(&query, &same, &MatchConfig::default()).unwrap();
    assert_eq!(res.score(), 1.0);

    //positional comparison does not realign a shifted copy.
    let mut shifted = hashes(&query);
    shifted.rotate_right(1);
    let res = match_by_line(&query, &sequence_from_hashes(&shifted, 100.0), &MatchConfig::default()).unwrap();
    assert_eq!(res.matched, 0);
    assert_eq!(res.compared, 8);

    assert!(match_by_line(&query, &random_sequence(9, &mut rng), &MatchConfig::default()).is_err());
}

#[test]
fn test_index_finds_only_related_videos() {
    let mut rng = StdRng::seed_from_u64(10);
    let query = random_sequence(20, &mut rng);

    let mut index = FeatureIndex::default();
    for i in 0..20 {
        index.insert(format!("unrelated_{i}"), random_sequence(15, &mut rng));
    }

    //a clip from the middle of the query inside a longer video.
    let mut clip = (0..5).map(|_| random_hash(&mut rng)).collect::<Vec<_>>();
    clip.extend(hashes(&query)[8..16].iter().map(|h| hash_with_distance(h, 5, &mut rng)));
    index.insert("clip".to_string(), sequence_from_hashes(&clip, 100.0));

    let found = index.query(&query, &MatchConfig::default());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "clip");
    assert_eq!(found[0].result.score, 8.0 / 20.0);
    assert_eq!(found[0].result.segments[0].reference_start_frame, 5);
}
