use serde::{Deserialize, Serialize};

use crate::definitions::MAX_QUALITY;
use crate::{Hash256, SequenceError};

/// The fingerprint of a single sampled frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VpdqFeature {
    /// Index of the frame in decode order.
    pub frame_number: u64,
    /// Presentation time in seconds.
    pub timestamp: f64,
    pub hash: Hash256,
    /// 0 means the hash is unusable, 100 means the frame was maximally distinctive.
    pub quality: f64,
}

impl VpdqFeature {
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.hash.hamming_distance(&other.hash)
    }
}

/// The fingerprint of a whole video: its sampled frame features in decode order.
///
/// Frame numbers are strictly increasing and timestamps never decrease. Both invariants are
/// checked when the sequence is built, and the sequence cannot be modified afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureSequence")]
pub struct FeatureSequence {
    features: Vec<VpdqFeature>,
    seconds_per_hash: f64,
    duration: f64,
}

//unvalidated form, used so that deserialization goes through the same checks as `new`.
#[derive(Deserialize)]
struct RawFeatureSequence {
    features: Vec<VpdqFeature>,
    seconds_per_hash: f64,
    duration: f64,
}

impl TryFrom<RawFeatureSequence> for FeatureSequence {
    type Error = SequenceError;

    fn try_from(raw: RawFeatureSequence) -> Result<Self, Self::Error> {
        Self::new(raw.features, raw.seconds_per_hash, raw.duration)
    }
}

impl FeatureSequence {
    /// Build a sequence from features that are already in decode order.
    ///
    /// # Errors
    /// Returns `Err` if frame numbers are not strictly increasing, timestamps decrease, or any
    /// timestamp or quality is out of range.
    pub fn new(
        features: Vec<VpdqFeature>,
        seconds_per_hash: f64,
        duration: f64,
    ) -> Result<Self, SequenceError> {
        validate(&features)?;
        Ok(Self {
            features,
            seconds_per_hash,
            duration,
        })
    }

    /// Build a sequence from features in any order, for example the output of parallel
    /// hashing. Features are sorted by frame number first.
    ///
    /// # Errors
    /// As [`FeatureSequence::new`]. Two features with the same frame number are an error.
    pub fn from_unordered(
        mut features: Vec<VpdqFeature>,
        seconds_per_hash: f64,
        duration: f64,
    ) -> Result<Self, SequenceError> {
        features.sort_by_key(|f| f.frame_number);
        Self::new(features, seconds_per_hash, duration)
    }

    pub fn features(&self) -> &[VpdqFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VpdqFeature> {
        self.features.iter()
    }

    /// The sampling interval the sequence was built with. 0 means every frame was hashed.
    pub fn seconds_per_hash(&self) -> f64 {
        self.seconds_per_hash
    }

    /// Duration of the source video in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Features with a quality of at least `min_quality`.
    pub fn eligible(&self, min_quality: f64) -> impl Iterator<Item = &VpdqFeature> + '_ {
        self.features.iter().filter(move |f| f.quality >= min_quality)
    }

    pub fn into_features(self) -> Vec<VpdqFeature> {
        self.features
    }
}

impl<'a> IntoIterator for &'a FeatureSequence {
    type Item = &'a VpdqFeature;
    type IntoIter = std::slice::Iter<'a, VpdqFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

fn validate(features: &[VpdqFeature]) -> Result<(), SequenceError> {
    for (index, feature) in features.iter().enumerate() {
        if !(0.0..=MAX_QUALITY).contains(&feature.quality) {
            return Err(SequenceError::Quality {
                index,
                quality: feature.quality,
            });
        }
        if !feature.timestamp.is_finite() || feature.timestamp < 0.0 {
            return Err(SequenceError::Timestamp {
                index,
                timestamp: feature.timestamp,
            });
        }
    }

    for (index, pair) in features.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.frame_number <= prev.frame_number {
            return Err(SequenceError::FrameOrder {
                index: index + 1,
                previous: prev.frame_number,
                frame_number: curr.frame_number,
            });
        }
        if curr.timestamp < prev.timestamp {
            return Err(SequenceError::TimestampOrder {
                index: index + 1,
                previous: prev.timestamp,
                timestamp: curr.timestamp,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use rand::prelude::*;

    use super::*;
    use crate::test_util::random_hash;

    fn feature(frame_number: u64, timestamp: f64, quality: f64) -> VpdqFeature {
        VpdqFeature {
            frame_number,
            timestamp,
            hash: Hash256::default(),
            quality,
        }
    }

    #[test]
    fn test_empty_sequence_is_valid() {
        let seq = FeatureSequence::new(vec![], 1.0, 0.0).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.eligible(0.0).count(), 0);
    }

    #[test]
    fn test_ordering_is_validated() {
        let err = FeatureSequence::new(vec![feature(0, 0.0, 50.0), feature(0, 1.0, 50.0)], 1.0, 2.0);
        assert!(matches!(err, Err(SequenceError::FrameOrder { index: 1, .. })));

        let err = FeatureSequence::new(vec![feature(0, 1.0, 50.0), feature(1, 0.5, 50.0)], 1.0, 2.0);
        assert!(matches!(err, Err(SequenceError::TimestampOrder { index: 1, .. })));

        //equal timestamps are fine
        assert!(FeatureSequence::new(vec![feature(0, 1.0, 50.0), feature(1, 1.0, 50.0)], 0.0, 2.0).is_ok());
    }

    #[test]
    fn test_ranges_are_validated() {
        let err = FeatureSequence::new(vec![feature(0, 0.0, 100.5)], 1.0, 1.0);
        assert!(matches!(err, Err(SequenceError::Quality { index: 0, .. })));

        let err = FeatureSequence::new(vec![feature(0, -1.0, 10.0)], 1.0, 1.0);
        assert!(matches!(err, Err(SequenceError::Timestamp { index: 0, .. })));
    }

    #[test]
    fn test_from_unordered() {
        let seq = FeatureSequence::from_unordered(
            vec![feature(5, 5.0, 1.0), feature(1, 1.0, 1.0), feature(3, 3.0, 1.0)],
            1.0,
            6.0,
        )
        .unwrap();
        let numbers = seq.iter().map(|f| f.frame_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 3, 5]);
    }

    #[test]
    fn test_eligible() {
        let seq = FeatureSequence::new(
            vec![feature(0, 0.0, 10.0), feature(1, 1.0, 50.0), feature(2, 2.0, 90.0)],
            1.0,
            3.0,
        )
        .unwrap();
        let numbers = seq.eligible(50.0).map(|f| f.frame_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_serde_validates() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let seq = FeatureSequence::new(
            vec![VpdqFeature {
                frame_number: 3,
                timestamp: 1.5,
                hash: random_hash(&mut rng),
                quality: 80.0,
            }],
            1.0,
            3.0,
        )
        .unwrap();

        let json = serde_json::to_string(&seq).unwrap();
        assert!(json.contains(&seq.features()[0].hash.to_hex()));
        assert_eq!(serde_json::from_str::<FeatureSequence>(&json).unwrap(), seq);

        let negative_timestamp = json.replace(r#""timestamp":1.5"#, r#""timestamp":-1.5"#);
        assert!(serde_json::from_str::<FeatureSequence>(&negative_timestamp).is_err());
    }
}
