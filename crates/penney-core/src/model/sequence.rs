use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PenneyError;

/// Number of symbols in a player's sequence.
pub const SEQUENCE_LEN: usize = 3;

/// A fixed-length pattern over the binary alphabet, e.g. `010`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sequence {
    symbols: [u8; SEQUENCE_LEN],
}

impl Sequence {
    pub const COUNT: usize = 1 << SEQUENCE_LEN;

    /// Builds the sequence whose binary digits spell `value`, most significant first.
    pub const fn from_index(value: u8) -> Self {
        let mut symbols = [0u8; SEQUENCE_LEN];
        let mut idx = 0;
        while idx < SEQUENCE_LEN {
            symbols[idx] = (value >> (SEQUENCE_LEN - 1 - idx)) & 1;
            idx += 1;
        }
        Self { symbols }
    }

    pub fn index(&self) -> usize {
        self.symbols
            .iter()
            .fold(0usize, |acc, &bit| (acc << 1) | bit as usize)
    }

    /// All sequences in lexicographic order (`000`, `001`, ..., `111`).
    pub fn all() -> impl Iterator<Item = Sequence> {
        (0..Self::COUNT as u8).map(Sequence::from_index)
    }

    pub fn symbols(&self) -> &[u8; SEQUENCE_LEN] {
        &self.symbols
    }

    /// Display form used on charts: `0` as B(lack), `1` as R(ed).
    pub fn colour_label(&self) -> String {
        self.symbols
            .iter()
            .map(|&bit| if bit == 0 { 'B' } else { 'R' })
            .collect()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.symbols {
            write!(f, "{bit}")?;
        }
        Ok(())
    }
}

impl FromStr for Sequence {
    type Err = PenneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.chars().count() != SEQUENCE_LEN {
            return Err(PenneyError::invalid(format!(
                "sequence '{trimmed}' must have exactly {SEQUENCE_LEN} symbols"
            )));
        }
        let mut symbols = [0u8; SEQUENCE_LEN];
        for (slot, ch) in symbols.iter_mut().zip(trimmed.chars()) {
            *slot = match ch {
                '0' => 0,
                '1' => 1,
                other => {
                    return Err(PenneyError::invalid(format!(
                        "sequence '{trimmed}' contains non-binary symbol '{other}'"
                    )));
                }
            };
        }
        Ok(Self { symbols })
    }
}

impl Serialize for Sequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered pair of distinct sequences: `first` belongs to player 1, `second` to player 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequencePair {
    first: Sequence,
    second: Sequence,
}

impl SequencePair {
    pub const COUNT: usize = Sequence::COUNT * (Sequence::COUNT - 1);

    pub fn new(first: Sequence, second: Sequence) -> Result<Self, PenneyError> {
        if first == second {
            return Err(PenneyError::invalid(format!(
                "player sequences must differ, both are '{first}'"
            )));
        }
        Ok(Self { first, second })
    }

    pub fn first(&self) -> Sequence {
        self.first
    }

    pub fn second(&self) -> Sequence {
        self.second
    }

    pub fn swapped(&self) -> Self {
        Self {
            first: self.second,
            second: self.first,
        }
    }

    /// Every ordered pair of distinct sequences, grouped by player 1's sequence.
    pub fn all() -> Vec<SequencePair> {
        let mut pairs = Vec::with_capacity(Self::COUNT);
        for first in Sequence::all() {
            for second in Sequence::all() {
                if first != second {
                    pairs.push(Self { first, second });
                }
            }
        }
        pairs
    }
}

impl fmt::Display for SequencePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.first, self.second)
    }
}
