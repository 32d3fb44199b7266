use std::{cmp::Ordering, fmt, str::FromStr};

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definitions::{HASH_BITS, HASH_HEX_LEN, HASH_WORDS};

/// A 256 bit perceptual hash of a single video frame.
///
/// Bit `k` of the hash is set when the `k`th selected DCT coefficient (row-major over the
/// 16x16 block of low frequencies) is at or above the median of all 256 coefficients.
///
/// The textual form is 64 hex digits with the most significant 64-bit word first, so bit 255
/// is the top bit of the first character.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash256 {
    words: [u64; HASH_WORDS],
}

/// Reasons why a string could not be parsed into a [`Hash256`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    #[error("expected {len} hex digits, found {0}", len = HASH_HEX_LEN)]
    Length(usize),

    #[error("invalid hex digit {0:?}")]
    Digit(char),
}

impl Hash256 {
    pub(crate) fn from_bitarray(bits: BitArray<[u64; HASH_WORDS], Lsb0>) -> Self {
        Self {
            words: bits.into_inner(),
        }
    }

    /// Build a hash from its bits, least significant first. Missing bits are zero and any bits
    /// past the 256th are ignored.
    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        let mut bitarr: BitArray<[u64; HASH_WORDS], Lsb0> = BitArray::ZERO;
        for (mut dest, bit) in bitarr.iter_mut().zip(bits) {
            *dest = bit;
        }
        Self::from_bitarray(bitarr)
    }

    /// The raw storage of the hash, least significant word first.
    #[must_use]
    pub const fn words(&self) -> [u64; HASH_WORDS] {
        self.words
    }

    #[must_use]
    pub const fn from_words(words: [u64; HASH_WORDS]) -> Self {
        Self { words }
    }

    /// The number of bits that differ between the two hashes. Always in 0..=256.
    #[must_use]
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .fold(0, |acc, (x, y)| acc + (x ^ y).count_ones())
    }

    #[must_use]
    pub fn bit(&self, idx: usize) -> bool {
        self.hash_bits()[idx]
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.hash_bits().iter().by_vals()
    }

    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    #[must_use]
    pub fn hash_bits(&self) -> &BitSlice<u64, Lsb0> {
        &self.words.view_bits::<Lsb0>()[..HASH_BITS as usize]
    }

    /// Extract `width` consecutive bits starting at `start` as an integer. Used to split the
    /// hash into bands for bucketing.
    pub(crate) fn band(&self, start: usize, width: usize) -> u64 {
        debug_assert!(width <= 64);
        self.hash_bits()[start..start + width].load_le::<u64>()
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl Ord for Hash256 {
    //numeric order of the 256 bit value, which matches the order of the hex strings.
    fn cmp(&self, other: &Self) -> Ordering {
        self.words.iter().rev().cmp(other.words.iter().rev())
    }
}

impl PartialOrd for Hash256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.words.iter().rev() {
            write!(f, "{word:016x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

impl FromStr for Hash256 {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(HashParseError::Digit(bad));
        }
        if s.len() != HASH_HEX_LEN {
            return Err(HashParseError::Length(s.len()));
        }

        let mut words = [0u64; HASH_WORDS];
        for (word, chunk) in words.iter_mut().rev().zip(s.as_bytes().chunks_exact(16)) {
            //all ascii hex digits, so the chunk is valid utf8 and a valid u64.
            let digits = std::str::from_utf8(chunk).expect("unreachable");
            *word = u64::from_str_radix(digits, 16).expect("unreachable");
        }

        Ok(Self { words })
    }
}

impl TryFrom<String> for Hash256 {
    type Error = HashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Hash256> for String {
    fn from(value: Hash256) -> Self {
        value.to_string()
    }
}
