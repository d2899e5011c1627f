use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::PenneyError;
use crate::model::sequence::{Sequence, SequencePair};
use crate::scoring::{Outcome, Rule};
use crate::storage::{Storage, read_optional};

/// Cumulative outcome counts for one pair under one rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub player1_wins: u64,
    pub player2_wins: u64,
    pub draws: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::PlayerOne => self.player1_wins += 1,
            Outcome::PlayerTwo => self.player2_wins += 1,
            Outcome::Draw => self.draws += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.player1_wins + self.player2_wins + self.draws
    }

    pub fn merged(&self, other: &Tally) -> Tally {
        Tally {
            player1_wins: self.player1_wins + other.player1_wins,
            player2_wins: self.player2_wins + other.player2_wins,
            draws: self.draws + other.draws,
        }
    }

    pub fn player1_win_pct(&self) -> f64 {
        percentage(self.player1_wins, self.total())
    }

    pub fn tie_pct(&self) -> f64 {
        percentage(self.draws, self.total())
    }
}

/// `count / total * 100` rounded to two decimals, halves to even; zero when `total` is zero.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 100.0).round_ties_even() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairStatistics {
    pub pair: SequencePair,
    pub tally: Tally,
}

/// Persisted row; percentages are written for readers but recomputed on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PairRecord {
    #[serde(rename = "Sequence1")]
    sequence1: Sequence,
    #[serde(rename = "Sequence2")]
    sequence2: Sequence,
    #[serde(rename = "Player1Wins")]
    player1_wins: u64,
    #[serde(rename = "Player2Wins")]
    player2_wins: u64,
    #[serde(rename = "Draws")]
    draws: u64,
    #[serde(rename = "Player1Win%")]
    player1_win_pct: f64,
    #[serde(rename = "Tie%")]
    tie_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatsFile {
    seed: u64,
    rule: Rule,
    decks_processed: u64,
    rows: Vec<PairRecord>,
}

/// Statistics for all ordered pairs of one seed under one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsTable {
    seed: u64,
    rule: Rule,
    rows: Vec<PairStatistics>,
}

impl StatsTable {
    pub fn empty(seed: u64, rule: Rule) -> Self {
        let rows = SequencePair::all()
            .into_iter()
            .map(|pair| PairStatistics {
                pair,
                tally: Tally::default(),
            })
            .collect();
        Self { seed, rule, rows }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn rows(&self) -> &[PairStatistics] {
        &self.rows
    }

    pub fn get(&self, pair: &SequencePair) -> Option<&PairStatistics> {
        self.rows.iter().find(|row| &row.pair == pair)
    }

    /// Decks folded in so far; identical for every row.
    pub fn decks_processed(&self) -> u64 {
        self.rows.first().map_or(0, |row| row.tally.total())
    }

    /// Adds one batch's counts to the cumulative counts of `pair`.
    pub fn merge(&mut self, pair: &SequencePair, batch: &Tally) {
        if let Some(row) = self.rows.iter_mut().find(|row| &row.pair == pair) {
            row.tally = row.tally.merged(batch);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let file = StatsFile {
            seed: self.seed,
            rule: self.rule,
            decks_processed: self.decks_processed(),
            rows: self
                .rows
                .iter()
                .map(|row| PairRecord {
                    sequence1: row.pair.first(),
                    sequence2: row.pair.second(),
                    player1_wins: row.tally.player1_wins,
                    player2_wins: row.tally.player2_wins,
                    draws: row.tally.draws,
                    player1_win_pct: row.tally.player1_win_pct(),
                    tie_pct: row.tally.tie_pct(),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file)
    }

    pub fn load(storage: &Storage, seed: u64, rule: Rule) -> Result<Self, PenneyError> {
        let path = storage.stats_path(seed, rule);
        let Some(bytes) = read_optional(&path)? else {
            return Err(PenneyError::NotFound {
                seed,
                what: "pair statistics",
            });
        };
        let corrupt = |message: String| PenneyError::corrupt(seed, "pair statistics", &path, message);

        let file: StatsFile = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if file.seed != seed || file.rule != rule {
            return Err(corrupt(format!(
                "file holds {} statistics for seed {}",
                file.rule, file.seed
            )));
        }

        let mut table = Self::empty(seed, rule);
        if file.rows.len() != table.rows.len() {
            return Err(corrupt(format!(
                "expected {} pair rows, found {}",
                table.rows.len(),
                file.rows.len()
            )));
        }
        let mut seen = HashSet::new();
        for record in file.rows {
            let pair = SequencePair::new(record.sequence1, record.sequence2)
                .map_err(|e| corrupt(e.to_string()))?;
            let tally = Tally {
                player1_wins: record.player1_wins,
                player2_wins: record.player2_wins,
                draws: record.draws,
            };
            if tally.total() != file.decks_processed {
                return Err(corrupt(format!(
                    "pair {pair} totals {} decks, header says {}",
                    tally.total(),
                    file.decks_processed
                )));
            }
            if !seen.insert(pair) {
                return Err(corrupt(format!("pair {pair} listed twice")));
            }
            table.merge(&pair, &tally);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::write_atomic;
    use tempfile::tempdir;

    fn pair(a: &str, b: &str) -> SequencePair {
        SequencePair::new(a.parse().unwrap(), b.parse().unwrap()).unwrap()
    }

    #[test]
    fn percentages_round_to_two_decimals() {
        let tally = Tally {
            player1_wins: 1,
            player2_wins: 1,
            draws: 1,
        };
        assert_eq!(tally.player1_win_pct(), 33.33);
        assert_eq!(tally.tie_pct(), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(Tally::default().player1_win_pct(), 0.0);
    }

    #[test]
    fn exact_halves_round_to_even() {
        assert_eq!(percentage(1, 32), 3.12);
        assert_eq!(percentage(3, 32), 9.38);
        assert_eq!(percentage(1, 8), 12.5);
    }

    #[test]
    fn merge_adds_counts_and_recomputes_percentages() {
        let mut table = StatsTable::empty(1, Rule::Cards);
        let p = pair("011", "110");
        table.merge(
            &p,
            &Tally {
                player1_wins: 3,
                player2_wins: 1,
                draws: 0,
            },
        );
        table.merge(
            &p,
            &Tally {
                player1_wins: 1,
                player2_wins: 2,
                draws: 1,
            },
        );
        let row = table.get(&p).unwrap();
        assert_eq!(row.tally.total(), 8);
        assert_eq!(row.tally.player1_win_pct(), 50.0);
        assert_eq!(row.tally.tie_pct(), 12.5);
    }

    #[test]
    fn json_uses_tabular_column_names() {
        let table = StatsTable::empty(3, Rule::Tricks);
        let json = table.to_json().unwrap();
        assert!(json.contains("\"Sequence1\": \"000\""));
        assert!(json.contains("\"Player1Win%\""));
        assert!(json.contains("\"rule\": \"tricks\""));
    }

    #[test]
    fn load_round_trips_and_checks_totals() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let mut table = StatsTable::empty(4, Rule::Cards);
        for p in SequencePair::all() {
            table.merge(
                &p,
                &Tally {
                    player1_wins: 2,
                    player2_wins: 0,
                    draws: 1,
                },
            );
        }
        let path = storage.stats_path(4, Rule::Cards);
        write_atomic(&path, table.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(StatsTable::load(&storage, 4, Rule::Cards).unwrap(), table);

        let tampered = table.to_json().unwrap().replacen("\"Draws\": 1", "\"Draws\": 2", 1);
        write_atomic(&path, tampered.as_bytes()).unwrap();
        let err = StatsTable::load(&storage, 4, Rule::Cards).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptState);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let err = StatsTable::load(&storage, 9, Rule::Tricks).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
