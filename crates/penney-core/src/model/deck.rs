use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::PenneyError;

/// Contiguous row-major batch of decks sharing one half-deck size.
///
/// Each row holds `2 * half_deck_size` symbols, exactly half of them `0`
/// and half `1`. Rows are immutable once pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckBatch {
    half_deck_size: usize,
    symbols: Vec<u8>,
}

impl DeckBatch {
    pub fn new(half_deck_size: usize) -> Self {
        Self {
            half_deck_size,
            symbols: Vec::new(),
        }
    }

    /// Reserves room for `decks` rows, rejecting sizes that cannot be addressed.
    pub fn with_capacity(half_deck_size: usize, decks: usize) -> Result<Self, PenneyError> {
        let symbols = symbols_for(half_deck_size, decks).ok_or_else(|| {
            PenneyError::invalid(format!(
                "{decks} decks of {} cards exceed addressable memory",
                half_deck_size.saturating_mul(2)
            ))
        })?;
        Ok(Self {
            half_deck_size,
            symbols: Vec::with_capacity(symbols),
        })
    }

    /// Wraps raw symbols; the caller guarantees `symbols.len()` is a multiple of the width.
    pub(crate) fn from_raw(half_deck_size: usize, symbols: Vec<u8>) -> Self {
        debug_assert!(half_deck_size == 0 || symbols.len() % (half_deck_size * 2) == 0);
        Self {
            half_deck_size,
            symbols,
        }
    }

    pub fn half_deck_size(&self) -> usize {
        self.half_deck_size
    }

    pub fn deck_len(&self) -> usize {
        self.half_deck_size * 2
    }

    pub fn len(&self) -> usize {
        if self.deck_len() == 0 {
            0
        } else {
            self.symbols.len() / self.deck_len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn deck(&self, index: usize) -> Option<&[u8]> {
        let width = self.deck_len();
        let start = index.checked_mul(width)?;
        self.symbols.get(start..start + width)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.symbols.chunks_exact(self.deck_len().max(1))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.symbols
    }

    /// Appends one freshly shuffled balanced deck.
    pub fn push_shuffled<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let start = self.symbols.len();
        self.symbols.resize(start + self.half_deck_size, 0);
        self.symbols.resize(start + self.deck_len(), 1);
        self.symbols[start..].shuffle(rng);
    }

    pub fn extend_from(&mut self, other: &DeckBatch) {
        debug_assert_eq!(self.half_deck_size, other.half_deck_size);
        self.symbols.extend_from_slice(&other.symbols);
    }

    /// Splits off the decks from `at` onwards, leaving `[0, at)` in place.
    pub fn split_off(&mut self, at: usize) -> DeckBatch {
        let offset = (at * self.deck_len()).min(self.symbols.len());
        DeckBatch {
            half_deck_size: self.half_deck_size,
            symbols: self.symbols.split_off(offset),
        }
    }

    /// Index of the first deck whose symbol counts are not balanced.
    pub fn first_unbalanced(&self) -> Option<usize> {
        self.iter()
            .position(|deck| !is_balanced(deck, self.half_deck_size))
    }
}

/// Symbols held by `decks` rows, `None` when that overflows an allocation.
pub fn symbols_for(half_deck_size: usize, decks: usize) -> Option<usize> {
    half_deck_size
        .checked_mul(2)?
        .checked_mul(decks)
        .filter(|&symbols| symbols <= isize::MAX as usize)
}

pub fn is_balanced(deck: &[u8], half_deck_size: usize) -> bool {
    deck.len() == half_deck_size * 2
        && deck.iter().all(|&s| s <= 1)
        && deck.iter().filter(|&&s| s == 1).count() == half_deck_size
}
