pub mod ledger;
pub mod stats;

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{ErrorKind, PenneyError};
use crate::generator::StartMode;
use crate::generator::shard::ShardSet;
use crate::model::deck::DeckBatch;
use crate::model::sequence::SequencePair;
use crate::scoring::{Outcome, Rule};
use crate::storage::{Storage, discard, publish, read_optional, stage, write_atomic};
use ledger::ProgressLedger;
use stats::{StatsTable, Tally};

/// Result of one aggregation pass.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub seed: u64,
    pub start: StartMode,
    pub decks_added: u64,
    pub cards: StatsTable,
    pub tricks: StatsTable,
}

impl AggregateReport {
    pub fn table(&self, rule: Rule) -> &StatsTable {
        match rule {
            Rule::Cards => &self.cards,
            Rule::Tricks => &self.tricks,
        }
    }

    pub fn decks_processed(&self) -> u64 {
        self.cards.decks_processed()
    }
}

/// Folds not-yet-scored decks of a seed into its persisted statistics.
#[derive(Debug, Clone)]
pub struct Aggregator {
    storage: Storage,
    ledger: ProgressLedger,
}

struct Prior {
    start: StartMode,
    marker: u64,
    cards: StatsTable,
    tricks: StatsTable,
}

impl Aggregator {
    pub fn new(storage: Storage) -> Self {
        Self {
            ledger: ProgressLedger::new(storage.clone()),
            storage,
        }
    }

    pub fn process(&self, seed: u64, resume: bool) -> Result<AggregateReport, PenneyError> {
        let _lock = self.storage.lock_seed(seed)?;

        let Prior {
            start,
            marker,
            cards,
            tricks,
        } = if resume {
            self.load_prior(seed)?
        } else {
            Prior {
                start: StartMode::Fresh,
                marker: 0,
                cards: StatsTable::empty(seed, Rule::Cards),
                tricks: StatsTable::empty(seed, Rule::Tricks),
            }
        };
        let mut tables = [cards, tricks];

        let shards = ShardSet::scan(&self.storage, seed)?;
        let available = shards.total_decks();
        if marker > available {
            return Err(PenneyError::corrupt(
                seed,
                "progress record",
                self.storage.progress_path(seed),
                format!("{marker} decks recorded as processed but only {available} exist"),
            ));
        }
        for table in &tables {
            if table.decks_processed() > available {
                return Err(PenneyError::corrupt(
                    seed,
                    "pair statistics",
                    self.storage.stats_path(seed, table.rule()),
                    format!(
                        "statistics cover {} decks but only {available} exist",
                        table.decks_processed()
                    ),
                ));
            }
        }

        // Tables never lag the marker, and only lead it after an interrupted commit.
        let from = tables
            .iter()
            .map(StatsTable::decks_processed)
            .min()
            .unwrap_or(marker);
        if from > marker {
            warn!(
                seed,
                marker,
                decks_processed = from,
                "completing an interrupted statistics commit"
            );
        }

        let suffix = match shards.half_deck_size(seed)? {
            Some(half) => shards.load_suffix(seed, from, half)?,
            None => DeckBatch::new(0),
        };
        let total = from + suffix.len() as u64;

        if total == marker && start == StartMode::Resumed {
            info!(seed, decks_processed = marker, "no new decks to aggregate");
            let [cards, tricks] = tables;
            return Ok(AggregateReport {
                seed,
                start,
                decks_added: 0,
                cards,
                tricks,
            });
        }

        fold_suffix(&mut tables, &suffix, from);
        let [cards, tricks] = tables;
        self.commit(seed, total, &cards, &tricks)?;

        let decks_added = total - marker;
        info!(seed, decks_added, decks_processed = total, "aggregated decks");

        Ok(AggregateReport {
            seed,
            start,
            decks_added,
            cards,
            tricks,
        })
    }

    fn load_prior(&self, seed: u64) -> Result<Prior, PenneyError> {
        let marker = self.ledger.load(seed);
        let cards = StatsTable::load(&self.storage, seed, Rule::Cards);
        let tricks = StatsTable::load(&self.storage, seed, Rule::Tricks);

        if is_not_found(&marker) && is_not_found(&cards) && is_not_found(&tricks) {
            warn!(seed, "no statistics to resume from; aggregating from scratch");
            return Ok(Prior {
                start: StartMode::FreshAfterMissingState,
                marker: 0,
                cards: StatsTable::empty(seed, Rule::Cards),
                tricks: StatsTable::empty(seed, Rule::Tricks),
            });
        }

        let marker = marker.map_err(|err| match err.kind() {
            ErrorKind::NotFound => PenneyError::corrupt(
                seed,
                "progress record",
                self.storage.progress_path(seed),
                "statistics exist but the progress record is missing",
            ),
            _ => err,
        })?;
        let (cards, tricks) = match (cards, tricks) {
            (Ok(cards), Ok(tricks)) => (cards, tricks),
            (Err(err), _) | (_, Err(err)) if err.kind() != ErrorKind::NotFound => return Err(err),
            _ => {
                return Err(PenneyError::corrupt(
                    seed,
                    "pair statistics",
                    self.storage.root(),
                    "progress record exists but a statistics file is missing",
                ));
            }
        };
        for table in [&cards, &tricks] {
            if table.decks_processed() < marker {
                return Err(PenneyError::corrupt(
                    seed,
                    "pair statistics",
                    self.storage.stats_path(seed, table.rule()),
                    format!(
                        "statistics cover {} decks but progress record says {marker}",
                        table.decks_processed()
                    ),
                ));
            }
        }
        Ok(Prior {
            start: StartMode::Resumed,
            marker,
            cards,
            tricks,
        })
    }

    /// Publishes both statistics files, then the progress record.
    ///
    /// Files already renamed into place are restored when a later rename fails, so a failed
    /// commit leaves the previous generation of every file behind.
    fn commit(
        &self,
        seed: u64,
        marker: u64,
        cards: &StatsTable,
        tricks: &StatsTable,
    ) -> Result<(), PenneyError> {
        let mut targets = Vec::with_capacity(3);
        for table in [cards, tricks] {
            let path = self.storage.stats_path(seed, table.rule());
            let json = table
                .to_json()
                .map_err(|e| PenneyError::corrupt(seed, "pair statistics", &path, e.to_string()))?;
            targets.push((path, json.into_bytes()));
        }
        targets.push(self.ledger.record(seed, marker));

        let previous = targets
            .iter()
            .map(|(path, _)| read_optional(path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(targets.len());
        for (path, bytes) in &targets {
            match stage(path, bytes) {
                Ok(tmp) => staged.push((tmp, path.as_path())),
                Err(err) => {
                    for (tmp, _) in &staged {
                        discard(tmp);
                    }
                    return Err(err);
                }
            }
        }

        for (done, (tmp, path)) in staged.iter().enumerate() {
            if let Err(err) = publish(tmp, path) {
                for (tmp, _) in &staged[done..] {
                    discard(tmp);
                }
                for ((_, path), prior) in staged[..done].iter().zip(&previous) {
                    restore(seed, path, prior.as_deref());
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

fn restore(seed: u64, path: &Path, prior: Option<&[u8]>) {
    let outcome = match prior {
        Some(bytes) => write_atomic(path, bytes),
        None => std::fs::remove_file(path)
            .map_err(|e| PenneyError::io("removing", path, e)),
    };
    if let Err(err) = outcome {
        warn!(seed, path = %path.display(), %err, "could not roll back statistics file");
    }
}

/// Merges the decks each table has not yet seen; `suffix` starts at deck `from`.
fn fold_suffix(tables: &mut [StatsTable; 2], suffix: &DeckBatch, from: u64) {
    let skip = tables
        .each_ref()
        .map(|table| (table.decks_processed() - from) as usize);
    match skip {
        [0, 0] => merge_both(tables, suffix),
        [cards, tricks] if cards == tricks => merge_both(tables, &tail_from(suffix, cards)),
        _ => {
            for (slot, table) in tables.iter_mut().enumerate() {
                for (pair, tallies) in score_batch(&tail_from(suffix, skip[slot])) {
                    table.merge(&pair, &tallies[slot]);
                }
            }
        }
    }
}

fn merge_both(tables: &mut [StatsTable; 2], decks: &DeckBatch) {
    for (pair, tallies) in score_batch(decks) {
        for (table, tally) in tables.iter_mut().zip(&tallies) {
            table.merge(&pair, tally);
        }
    }
}

fn tail_from(decks: &DeckBatch, at: usize) -> DeckBatch {
    let mut head = decks.clone();
    head.split_off(at)
}

fn is_not_found<T>(result: &Result<T, PenneyError>) -> bool {
    matches!(result, Err(err) if err.kind() == ErrorKind::NotFound)
}

/// Scores every deck for every ordered pair under both rules, one task per pair.
///
/// Returned tallies are indexed like [`Rule::ALL`].
pub fn score_batch(decks: &DeckBatch) -> Vec<(SequencePair, [Tally; 2])> {
    SequencePair::all()
        .into_par_iter()
        .map(|pair| {
            let mut tallies = [Tally::default(); 2];
            for deck in decks.iter() {
                for (tally, rule) in tallies.iter_mut().zip(Rule::ALL) {
                    tally.record(Outcome::from_scores(rule.score(deck, &pair)));
                }
            }
            (pair, tallies)
        })
        .collect()
}
