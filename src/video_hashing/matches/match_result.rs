use serde::{Deserialize, Serialize};

use crate::VpdqFeature;

/// A query frame and the reference frame it was aligned with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub query: VpdqFeature,
    pub reference: VpdqFeature,
    pub distance: u32,
}

impl MatchedPair {
    /// The same pair seen from the other side.
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            query: self.reference,
            reference: self.query,
            distance: self.distance,
        }
    }
}

/// A run of consecutive matching frames, with its extent in both videos.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchedSegment {
    /// Number of matched frames in the run.
    pub len: usize,
    pub query_start_frame: u64,
    pub query_end_frame: u64,
    pub reference_start_frame: u64,
    pub reference_end_frame: u64,
    /// Timestamps of the first and last matched frames, in seconds.
    pub query_start_time: f64,
    pub query_end_time: f64,
    pub reference_start_time: f64,
    pub reference_end_time: f64,
}

impl MatchedSegment {
    pub(crate) fn from_pairs(pairs: &[MatchedPair]) -> Option<Self> {
        let (first, last) = (pairs.first()?, pairs.last()?);
        Some(Self {
            len: pairs.len(),
            query_start_frame: first.query.frame_number,
            query_end_frame: last.query.frame_number,
            reference_start_frame: first.reference.frame_number,
            reference_end_frame: last.reference.frame_number,
            query_start_time: first.query.timestamp,
            query_end_time: last.query.timestamp,
            reference_start_time: first.reference.timestamp,
            reference_end_time: last.reference.timestamp,
        })
    }

    /// Offset of the reference relative to the query, in seconds. Positive when the matched
    /// content occurs later in the reference.
    pub fn time_offset(&self) -> f64 {
        self.reference_start_time - self.query_start_time
    }

    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            len: self.len,
            query_start_frame: self.reference_start_frame,
            query_end_frame: self.reference_end_frame,
            reference_start_frame: self.query_start_frame,
            reference_end_frame: self.query_end_frame,
            query_start_time: self.reference_start_time,
            query_end_time: self.reference_end_time,
            reference_start_time: self.query_start_time,
            reference_end_time: self.query_end_time,
        }
    }
}

/// The outcome of comparing a query fingerprint against a reference fingerprint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchResult {
    /// Matched pairs belonging to accepted segments, in query order.
    pub pairs: Vec<MatchedPair>,
    pub segments: Vec<MatchedSegment>,
    /// Fraction of eligible query frames covered by segments, in 0..=1.
    pub score: f64,
    /// Fraction of eligible reference frames covered by segments, in 0..=1.
    pub reference_score: f64,
    pub eligible_query: usize,
    pub eligible_reference: usize,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Number of frames covered by segments. The same on both sides.
    pub fn matched_frames(&self) -> usize {
        self.pairs.len()
    }

    /// The result of the comparison made the other way round.
    #[must_use]
    pub fn swapped(&self) -> Self {
        let mut pairs = self.pairs.iter().map(MatchedPair::swapped).collect::<Vec<_>>();
        let mut segments = self.segments.iter().map(MatchedSegment::swapped).collect::<Vec<_>>();
        pairs.sort_by_key(|p| p.query.frame_number);
        segments.sort_by_key(|s| s.query_start_frame);

        Self {
            pairs,
            segments,
            score: self.reference_score,
            reference_score: self.score,
            eligible_query: self.eligible_reference,
            eligible_reference: self.eligible_query,
        }
    }
}

/// The outcome of comparing two fingerprints frame by frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LineMatch {
    /// Number of positions where both frames were of sufficient quality.
    pub compared: usize,
    /// Number of compared positions within the distance threshold.
    pub matched: usize,
}

impl LineMatch {
    /// `matched / compared`, or 0 if nothing was compared.
    pub fn score(&self) -> f64 {
        if self.compared == 0 {
            0.0
        } else {
            self.matched as f64 / self.compared as f64
        }
    }
}
