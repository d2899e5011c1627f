//! Sequence-matching scoring rules.
//!
//! Both rules scan a deck left to right over windows of [`SEQUENCE_LEN`]
//! cards. A window equal to player 1's sequence is checked before player 2's;
//! a match consumes the whole window (the cursor jumps past it), a miss
//! advances the cursor by one card.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::sequence::{SEQUENCE_LEN, SequencePair};

/// Bonus awarded on top of the pile for the window cards a match consumes.
const MATCH_BONUS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Winner of each match collects the pile of examined windows plus the bonus.
    Cards,
    /// Each match is worth a single trick.
    Tricks,
}

impl Rule {
    pub const ALL: [Rule; 2] = [Rule::Cards, Rule::Tricks];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Rule::Cards => "cards",
            Rule::Tricks => "tricks",
        }
    }

    pub fn score(&self, deck: &[u8], pair: &SequencePair) -> (u32, u32) {
        match self {
            Rule::Cards => cards(deck, pair),
            Rule::Tricks => tricks(deck, pair),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Player {
    One,
    Two,
}

/// Result of one deck for one pair under one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    PlayerOne,
    PlayerTwo,
    Draw,
}

impl Outcome {
    pub fn from_scores((first, second): (u32, u32)) -> Self {
        match first.cmp(&second) {
            std::cmp::Ordering::Greater => Outcome::PlayerOne,
            std::cmp::Ordering::Less => Outcome::PlayerTwo,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

fn scan(deck: &[u8], pair: &SequencePair, mut on_match: impl FnMut(Player, u32)) {
    let first = pair.first();
    let second = pair.second();
    let mut pile = 0u32;
    let mut i = 0usize;
    while i + SEQUENCE_LEN <= deck.len() {
        pile += 1;
        let window = &deck[i..i + SEQUENCE_LEN];
        if window == first.symbols() {
            on_match(Player::One, pile);
            pile = 0;
            i += SEQUENCE_LEN;
        } else if window == second.symbols() {
            on_match(Player::Two, pile);
            pile = 0;
            i += SEQUENCE_LEN;
        } else {
            i += 1;
        }
    }
}

/// Pile-collection scoring: a match awards the windows examined since the
/// previous match (including the matching one) plus a fixed bonus.
pub fn cards(deck: &[u8], pair: &SequencePair) -> (u32, u32) {
    let mut scores = (0u32, 0u32);
    scan(deck, pair, |player, pile| match player {
        Player::One => scores.0 += pile + MATCH_BONUS,
        Player::Two => scores.1 += pile + MATCH_BONUS,
    });
    scores
}

/// Trick counting: every match is worth one point.
pub fn tricks(deck: &[u8], pair: &SequencePair) -> (u32, u32) {
    let mut counts = (0u32, 0u32);
    scan(deck, pair, |player, _| match player {
        Player::One => counts.0 += 1,
        Player::Two => counts.1 += 1,
    });
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sequence::Sequence;

    fn pair(a: &str, b: &str) -> SequencePair {
        SequencePair::new(a.parse().unwrap(), b.parse().unwrap()).unwrap()
    }

    #[test]
    fn split_runs_draw_under_both_rules() {
        let deck = [0, 0, 0, 1, 1, 1];
        let p = pair("000", "111");
        assert_eq!(cards(&deck, &p), (3, 3));
        assert_eq!(tricks(&deck, &p), (1, 1));
        assert_eq!(Outcome::from_scores(cards(&deck, &p)), Outcome::Draw);
    }

    #[test]
    fn alternating_deck_draws() {
        let deck = [0, 1, 0, 1, 0, 1];
        let p = pair("010", "101");
        assert_eq!(cards(&deck, &p), (3, 3));
        assert_eq!(tricks(&deck, &p), (1, 1));
    }

    #[test]
    fn pile_accumulates_across_misses() {
        // 110, 100 miss; 001 matches with a pile of 3; 011 misses; deck exhausted
        let deck = [1, 1, 0, 0, 1, 0, 1, 1];
        let p = pair("001", "111");
        assert_eq!(cards(&deck, &p), (5, 0));
        assert_eq!(tricks(&deck, &p), (1, 0));
    }

    #[test]
    fn pile_resets_after_each_match() {
        // 000 matches at 0 (pile 1); 101, 011 miss; 111 matches at 5 (pile 3)
        let deck = [0, 0, 0, 1, 0, 1, 1, 1];
        let p = pair("000", "111");
        assert_eq!(cards(&deck, &p), (3, 5));
        assert_eq!(tricks(&deck, &p), (1, 1));
    }

    #[test]
    fn match_skips_overlapping_windows() {
        // 100 matches at 2, so the 000 window starting at 3 is never examined
        let deck = [0, 1, 1, 0, 0, 0, 1, 1];
        let p = pair("000", "100");
        assert_eq!(cards(&deck, &p), (0, 5));
        assert_eq!(tricks(&deck, &p), (0, 1));
    }

    #[test]
    fn player_one_wins_window_checks_first() {
        // overlapping opportunities: "000" at 0 claims cards 0..3, so "001" at 1 is skipped
        let deck = [0, 0, 0, 1, 1, 1];
        let p = pair("000", "001");
        assert_eq!(tricks(&deck, &p), (1, 0));
        let swapped = p.swapped();
        // with 001 first, window 0 "000" still belongs to the other player
        assert_eq!(tricks(&deck, &swapped), (0, 1));
    }

    #[test]
    fn short_deck_produces_no_matches() {
        let p = pair("000", "111");
        assert_eq!(cards(&[0, 0], &p), (0, 0));
        assert_eq!(tricks(&[], &p), (0, 0));
        assert_eq!(Outcome::from_scores((0, 0)), Outcome::Draw);
    }

    #[test]
    fn swapping_players_swaps_scores() {
        let deck = [1, 0, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1];
        for p in SequencePair::all() {
            let (a, b) = cards(&deck, &p);
            assert_eq!(cards(&deck, &p.swapped()), (b, a), "{p}");
            let (a, b) = tricks(&deck, &p);
            assert_eq!(tricks(&deck, &p.swapped()), (b, a), "{p}");
        }
    }

    #[test]
    fn rule_dispatch_matches_free_functions() {
        let deck = [1, 1, 0, 1, 0, 0];
        let p = SequencePair::new(Sequence::from_index(6), Sequence::from_index(4)).unwrap();
        assert_eq!(Rule::Cards.score(&deck, &p), cards(&deck, &p));
        assert_eq!(Rule::Tricks.score(&deck, &p), tricks(&deck, &p));
        assert_eq!(Rule::Tricks.to_string(), "tricks");
    }
}
