//! The fingerprint exchange format (version 1).
//!
//! One line per feature, `frame_number,quality,hash_hex,timestamp`, with no header. Quality is
//! written as an integer when it is integral and in its shortest exact form otherwise. Timestamps
//! always have exactly 3 decimals.
//!
//! Sampling metadata is not part of the format. Decoded sequences take their duration from
//! the last timestamp and their sampling interval from the typical gap between timestamps.

use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use thiserror::Error;

use crate::definitions::{FORMAT_NUM_FIELDS, MAX_QUALITY, TIMESTAMP_DECIMALS};
use crate::video_hashing::hash256::HashParseError;
use crate::{FeatureSequence, Hash256, VpdqFeature};

/// A numeric field of a fingerprint line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FrameNumber,
    Quality,
    Timestamp,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FrameNumber => "frame number",
            Self::Quality => "quality",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatErrorKind {
    #[error("expected {expected} comma separated fields, found {0}", expected = FORMAT_NUM_FIELDS)]
    FieldCount(usize),

    #[error("hash must be 64 hex digits, found {0}")]
    HashLength(usize),

    #[error("invalid hex digit {0:?} in hash")]
    HashDigit(char),

    #[error("{0} is not a valid number")]
    Number(Field),

    #[error("quality {0} is outside 0..={max}", max = MAX_QUALITY)]
    QualityRange(f64),

    #[error("timestamp {0} is negative")]
    NegativeTimestamp(f64),

    #[error("frame {frame_number} at {timestamp}s does not follow frame {previous_frame} at {previous_timestamp}s")]
    Ordering {
        previous_frame: u64,
        previous_timestamp: f64,
        frame_number: u64,
        timestamp: f64,
    },
}

/// A malformed fingerprint file. The whole input is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {kind}")]
pub struct FormatError {
    /// 1-based line number of the offending line.
    pub line: usize,
    pub kind: FormatErrorKind,
}

/// Error type for reading or writing fingerprint files.
#[derive(Error, Debug)]
pub enum FingerprintFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed fingerprint: {0}")]
    Format(#[from] FormatError),
}

/// Encode a sequence into the text format.
#[must_use]
pub fn encode(seq: &FeatureSequence) -> String {
    let mut out = String::new();
    for feature in seq {
        out.push_str(&encode_line(feature));
        out.push('\n');
    }
    out
}

fn encode_line(feature: &VpdqFeature) -> String {
    format!(
        "{},{},{},{:.prec$}",
        feature.frame_number,
        format_quality(feature.quality),
        feature.hash,
        feature.timestamp,
        prec = TIMESTAMP_DECIMALS
    )
}

//shortest representation that parses back to the same value. Integral values have no point.
fn format_quality(quality: f64) -> String {
    format!("{quality}")
}

/// Decode the text format.
///
/// # Errors
/// Returns the first malformed line. Lines are checked in order, so the line number always
/// refers to the earliest problem in the input.
pub fn decode(input: &str) -> Result<FeatureSequence, FormatError> {
    let mut features: Vec<VpdqFeature> = vec![];

    for (idx, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let line_no = idx + 1;
        let err = |kind| FormatError {
            line: line_no,
            kind,
        };

        let feature = decode_line(line).map_err(err)?;

        if let Some(prev) = features.last() {
            if feature.frame_number <= prev.frame_number || feature.timestamp < prev.timestamp {
                return Err(err(FormatErrorKind::Ordering {
                    previous_frame: prev.frame_number,
                    previous_timestamp: prev.timestamp,
                    frame_number: feature.frame_number,
                    timestamp: feature.timestamp,
                }));
            }
        }

        features.push(feature);
    }

    let duration = features.last().map_or(0.0, |f| f.timestamp);
    let seconds_per_hash = typical_interval(&features);

    //every invariant of the sequence was checked line by line above.
    Ok(FeatureSequence::new(features, seconds_per_hash, duration).expect("unreachable"))
}

fn decode_line(line: &str) -> Result<VpdqFeature, FormatErrorKind> {
    let fields = line.split(',').map(str::trim).collect::<Vec<_>>();
    let [frame_number, quality, hash, timestamp] = fields.as_slice() else {
        return Err(FormatErrorKind::FieldCount(fields.len()));
    };

    let frame_number = frame_number
        .parse::<u64>()
        .map_err(|_| FormatErrorKind::Number(Field::FrameNumber))?;

    let quality = parse_float(quality, Field::Quality)?;
    if !(0.0..=MAX_QUALITY).contains(&quality) {
        return Err(FormatErrorKind::QualityRange(quality));
    }

    let hash = hash.parse::<Hash256>().map_err(|e| match e {
        HashParseError::Length(len) => FormatErrorKind::HashLength(len),
        HashParseError::Digit(c) => FormatErrorKind::HashDigit(c),
    })?;

    let timestamp = parse_float(timestamp, Field::Timestamp)?;
    if !timestamp.is_finite() {
        return Err(FormatErrorKind::Number(Field::Timestamp));
    }
    if timestamp < 0.0 {
        return Err(FormatErrorKind::NegativeTimestamp(timestamp));
    }

    Ok(VpdqFeature {
        frame_number,
        timestamp,
        hash,
        quality,
    })
}

fn parse_float(s: &str, field: Field) -> Result<f64, FormatErrorKind> {
    //rust accepts "inf" and "NaN", which are never valid here.
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return Err(FormatErrorKind::Number(field));
    }
    s.parse::<f64>().map_err(|_| FormatErrorKind::Number(field))
}

//median gap between consecutive timestamps, rounded to the format's precision.
fn typical_interval(features: &[VpdqFeature]) -> f64 {
    let mut gaps = features
        .windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .collect::<Vec<_>>();
    if gaps.is_empty() {
        return 0.0;
    }
    gaps.sort_by(f64::total_cmp);
    let scale = 10f64.powi(TIMESTAMP_DECIMALS as i32);
    (gaps[gaps.len() / 2] * scale).round() / scale
}

/// Write a sequence in the text format.
pub fn write_to(seq: &FeatureSequence, mut writer: impl Write) -> io::Result<()> {
    for feature in seq {
        writeln!(writer, "{}", encode_line(feature))?;
    }
    writer.flush()
}

/// Read a sequence in the text format.
pub fn read_from(mut reader: impl Read) -> Result<FeatureSequence, FingerprintFileError> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;
    Ok(decode(&input)?)
}

pub fn write_file(seq: &FeatureSequence, path: impl AsRef<Path>) -> Result<(), FingerprintFileError> {
    let file = File::create(path.as_ref())?;
    write_to(seq, BufWriter::new(file))?;
    Ok(())
}

pub fn read_file(path: impl AsRef<Path>) -> Result<FeatureSequence, FingerprintFileError> {
    let file = File::open(path.as_ref())?;
    read_from(io::BufReader::new(file))
}
