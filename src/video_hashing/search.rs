use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::definitions::{DEFAULT_INDEX_BANDS, HASH_BITS};
use crate::*;

/// Settings for a [`FeatureIndex`].
///
/// * `bands`: each hash is split into this many equal bit bands. Two frames are only compared
///   if at least one band is identical, so any pair of frames fewer than `bands` bits apart
///   is always found. Must divide 256 into bands of at most 64 bits.
/// * `min_score`: matches scoring below this are not returned (0..=1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    bands: usize,
    min_score: f64,
}

impl IndexConfig {
    /// # Errors
    /// Returns `Err` if `bands` does not split a hash into equal bands of at most 64 bits, or
    /// `min_score` is outside 0..=1.
    pub fn new(bands: usize, min_score: f64) -> Result<Self, ConfigError> {
        let bits = HASH_BITS as usize;
        if bands == 0 || bits % bands != 0 || bits / bands > 64 {
            return Err(ConfigError::Bands(bands));
        }
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ConfigError::MinScore(min_score));
        }
        Ok(Self { bands, min_score })
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    fn band_width(&self) -> usize {
        HASH_BITS as usize / self.bands
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bands: DEFAULT_INDEX_BANDS,
            min_score: 0.0,
        }
    }
}

/// A stored fingerprint that matched a query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch<'a, I> {
    pub id: &'a I,
    pub result: MatchResult,
}

/// A data structure for searching many stored fingerprints for matches to a query.
///
/// Every frame hash is bucketed by each of its bit bands. A query only runs the full matcher
/// against stored fingerprints that share at least one bucket with an eligible query frame.
#[derive(Debug)]
pub struct FeatureIndex<I> {
    cfg: IndexConfig,
    entries: Vec<(I, FeatureSequence)>,
    buckets: HashMap<(usize, u64), Vec<usize>>,
}

impl<I> Default for FeatureIndex<I> {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl<I> FeatureIndex<I> {
    pub fn new(cfg: IndexConfig) -> Self {
        Self {
            cfg,
            entries: vec![],
            buckets: HashMap::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a fingerprint to the index. All frames are indexed, whatever their quality, so the
    /// index can be queried with any quality setting.
    pub fn insert(&mut self, id: I, sequence: FeatureSequence) {
        let entry_idx = self.entries.len();
        for feature in &sequence {
            for key in band_keys(&self.cfg, &feature.hash) {
                let bucket = self.buckets.entry(key).or_default();
                if bucket.last() != Some(&entry_idx) {
                    bucket.push(entry_idx);
                }
            }
        }
        self.entries.push((id, sequence));
    }

    /// Ids of the stored fingerprints that share a bucket with an eligible frame of `query`,
    /// in insertion order.
    pub fn shortlist(&self, query: &FeatureSequence, match_cfg: &MatchConfig) -> Vec<&I> {
        self.shortlist_indices(query, match_cfg)
            .into_iter()
            .map(|idx| &self.entries[idx].0)
            .collect()
    }

    fn shortlist_indices(&self, query: &FeatureSequence, match_cfg: &MatchConfig) -> BTreeSet<usize> {
        query
            .eligible(match_cfg.min_quality())
            .flat_map(|feature| band_keys(&self.cfg, &feature.hash))
            .filter_map(|key| self.buckets.get(&key))
            .flatten()
            .copied()
            .collect()
    }
}

impl<I: Sync> FeatureIndex<I> {
    /// Match `query` against every shortlisted fingerprint and return those that matched with
    /// at least the configured minimum score, best first. Ties keep insertion order.
    pub fn query(&self, query: &FeatureSequence, match_cfg: &MatchConfig) -> Vec<IndexMatch<'_, I>> {
        let shortlist = self.shortlist_indices(query, match_cfg).into_iter().collect::<Vec<_>>();

        let mut matches = shortlist
            .par_iter()
            .filter_map(|&idx| {
                let (id, sequence) = &self.entries[idx];
                let result = match_sequences(query, sequence, match_cfg);
                (result.is_match() && result.score >= self.cfg.min_score).then_some((idx, IndexMatch { id, result }))
            })
            .collect::<Vec<_>>();

        matches.sort_by(|(a_idx, a), (b_idx, b)| b.result.score.total_cmp(&a.result.score).then(a_idx.cmp(b_idx)));

        debug!(
            target: "search",
            "{} of {} stored fingerprints shortlisted, {} matched",
            shortlist.len(),
            self.entries.len(),
            matches.len()
        );

        matches.into_iter().map(|(_, m)| m).collect()
    }
}

fn band_keys<'a>(cfg: &'a IndexConfig, hash: &'a Hash256) -> impl Iterator<Item = (usize, u64)> + 'a {
    let width = cfg.band_width();
    (0..cfg.bands).map(move |band| (band, hash.band(band * width, width)))
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;
    use crate::test_util::{hash_with_distance, random_sequence, sequence_from_hashes};

    #[test]
    fn test_config_ranges() {
        assert!(IndexConfig::new(16, 0.5).is_ok());
        assert!(IndexConfig::new(4, 0.0).is_ok());
        assert!(IndexConfig::new(256, 1.0).is_ok());

        assert_eq!(IndexConfig::new(0, 0.0), Err(ConfigError::Bands(0)));
        assert_eq!(IndexConfig::new(3, 0.0), Err(ConfigError::Bands(3)));
        //64 bits is the widest band.
        assert_eq!(IndexConfig::new(2, 0.0), Err(ConfigError::Bands(2)));
        assert_eq!(IndexConfig::new(16, 1.5), Err(ConfigError::MinScore(1.5)));
    }

    #[test]
    fn test_band_keys_cover_the_hash() {
        let mut rng = StdRng::seed_from_u64(1);
        let seq = random_sequence(1, &mut rng);
        let hash = seq.features()[0].hash;

        let cfg = IndexConfig::new(4, 0.0).unwrap();
        let keys = band_keys(&cfg, &hash).map(|(_, k)| k).collect::<Vec<_>>();
        assert_eq!(keys, hash.words().to_vec());
    }

    #[test]
    fn test_shortlist_and_query() {
        let mut rng = StdRng::seed_from_u64(2);
        let match_cfg = MatchConfig::new(8, 0.0, 1).unwrap();

        let query = random_sequence(10, &mut rng);
        //a noisy copy. Fewer than 8 bits flipped per frame, so every frame shares a band.
        let noisy = query
            .iter()
            .map(|f| hash_with_distance(&f.hash, 6, &mut rng))
            .collect::<Vec<_>>();
        //the second half of the query only.
        let half = query.iter().skip(5).map(|f| f.hash).collect::<Vec<_>>();

        //32 bit bands, so unrelated random hashes never share a bucket.
        let mut index = FeatureIndex::new(IndexConfig::new(8, 0.0).unwrap());
        index.insert("unrelated_a", random_sequence(20, &mut rng));
        index.insert("half", sequence_from_hashes(&half, 100.0));
        index.insert("unrelated_b", random_sequence(20, &mut rng));
        index.insert("noisy", sequence_from_hashes(&noisy, 100.0));

        assert_eq!(index.len(), 4);
        assert_eq!(index.shortlist(&query, &match_cfg), vec![&"half", &"noisy"]);

        let found = index.query(&query, &match_cfg);
        let ids = found.iter().map(|m| *m.id).collect::<Vec<_>>();
        assert_eq!(ids, vec!["noisy", "half"]);
        assert_eq!(found[0].result.score, 1.0);
        assert_eq!(found[1].result.score, 0.5);
    }

    #[test]
    fn test_min_score() {
        let mut rng = StdRng::seed_from_u64(3);
        let match_cfg = MatchConfig::new(0, 0.0, 1).unwrap();
        let query = random_sequence(4, &mut rng);
        let quarter = sequence_from_hashes(&[query.features()[0].hash], 100.0);

        let mut index = FeatureIndex::new(IndexConfig::new(16, 0.5).unwrap());
        index.insert(1, query.clone());
        index.insert(2, quarter);

        let found = index.query(&query, &match_cfg);
        assert_eq!(found.len(), 1);
        assert_eq!(*found[0].id, 1);
    }

    #[test]
    fn test_empty_index() {
        let mut rng = StdRng::seed_from_u64(4);
        let index = FeatureIndex::<String>::default();
        assert!(index.is_empty());
        assert!(index.query(&random_sequence(3, &mut rng), &MatchConfig::default()).is_empty());
    }
}
