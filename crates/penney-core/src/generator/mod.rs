pub mod shard;
pub mod state;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{ErrorKind, PenneyError};
use crate::model::deck::{DeckBatch, symbols_for};
use crate::storage::Storage;
use shard::{DEFAULT_SHARD_CAPACITY, ShardSet, read_shard, write_shard};
use state::{GeneratorState, RngStateStore, seeded_rng};

/// How a run obtained its starting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Started from scratch because resuming was not requested.
    Fresh,
    /// Continued from persisted state.
    Resumed,
    /// Resuming was requested but nothing was persisted for the seed.
    FreshAfterMissingState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub seed: u64,
    pub count: u64,
    pub half_deck_size: usize,
    pub resume: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub seed: u64,
    pub start: StartMode,
    pub decks_added: u64,
    pub decks_total: u64,
    pub decks_dir: PathBuf,
    pub shards_written: Vec<PathBuf>,
}

/// Produces shuffled balanced decks and packs them into shards.
#[derive(Debug, Clone)]
pub struct DeckGenerator {
    storage: Storage,
    states: RngStateStore,
    shard_capacity: usize,
}

impl DeckGenerator {
    pub fn new(storage: Storage) -> Self {
        Self::with_shard_capacity(storage, DEFAULT_SHARD_CAPACITY)
    }

    pub fn with_shard_capacity(storage: Storage, shard_capacity: usize) -> Self {
        Self {
            states: RngStateStore::new(storage.clone()),
            storage,
            shard_capacity,
        }
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome, PenneyError> {
        let seed = request.seed;
        if request.half_deck_size == 0 {
            return Err(PenneyError::invalid("half_deck_size must be greater than zero"));
        }
        if self.shard_capacity == 0 {
            return Err(PenneyError::invalid("shard capacity must be greater than zero"));
        }
        let count = usize::try_from(request.count)
            .ok()
            .filter(|&count| symbols_for(request.half_deck_size, count).is_some())
            .ok_or_else(|| {
                PenneyError::invalid(format!(
                    "{} decks of half size {} exceed addressable memory",
                    request.count, request.half_deck_size
                ))
            })?;
        let _lock = self.storage.lock_seed(seed)?;

        if count == 0 {
            let existing = ShardSet::scan(&self.storage, seed)?;
            info!(seed, "no decks requested; leaving stored decks untouched");
            return Ok(GenerationOutcome {
                seed,
                start: if request.resume { StartMode::Resumed } else { StartMode::Fresh },
                decks_added: 0,
                decks_total: existing.total_decks(),
                decks_dir: self.storage.decks_dir(),
                shards_written: Vec::new(),
            });
        }

        let (start, prior) = if request.resume {
            match self.states.load(seed) {
                Ok(state) => (StartMode::Resumed, Some(state)),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!(seed, "no generator state to resume from; starting fresh");
                    (StartMode::FreshAfterMissingState, None)
                }
                Err(err) => return Err(err),
            }
        } else {
            (StartMode::Fresh, None)
        };

        let existing = match &prior {
            Some(state) => Some(self.check_resumable(state, request.half_deck_size)?),
            None => None,
        };

        let mut rng = match &prior {
            Some(state) => state.restore(),
            None => seeded_rng(seed),
        };
        let mut fresh = DeckBatch::with_capacity(request.half_deck_size, count)?;
        for _ in 0..count {
            fresh.push_shuffled(&mut rng);
        }
        let decks_before = prior.as_ref().map_or(0, |state| state.decks_generated);
        let snapshot = GeneratorState::capture(
            seed,
            &rng,
            request.half_deck_size,
            decks_before + request.count,
        );

        if prior.is_none() {
            self.storage.clear_seed(seed)?;
        }
        let shards_written = self.write_shards(seed, existing.as_ref(), fresh)?;
        self.states.save(&snapshot)?;

        info!(
            seed,
            decks_added = request.count,
            decks_total = snapshot.decks_generated,
            shards = shards_written.len(),
            "generated decks"
        );

        Ok(GenerationOutcome {
            seed,
            start,
            decks_added: request.count,
            decks_total: snapshot.decks_generated,
            decks_dir: self.storage.decks_dir(),
            shards_written,
        })
    }

    fn check_resumable(&self, state: &GeneratorState, half_deck_size: usize) -> Result<ShardSet, PenneyError> {
        let seed = state.seed;
        if state.half_deck_size != half_deck_size {
            return Err(PenneyError::invalid(format!(
                "seed {seed} was generated with half_deck_size {} but {half_deck_size} was requested",
                state.half_deck_size
            )));
        }
        let existing = ShardSet::scan(&self.storage, seed)?;
        if let Some(half) = existing.half_deck_size(seed)? {
            if half != half_deck_size {
                return Err(PenneyError::corrupt(
                    seed,
                    "deck shard",
                    self.storage.decks_dir(),
                    format!("stored decks use half_deck_size {half}, generator state says {half_deck_size}"),
                ));
            }
        }
        if existing.total_decks() != state.decks_generated {
            return Err(PenneyError::corrupt(
                seed,
                "generator state",
                self.storage.state_path(seed),
                format!(
                    "state records {} decks but shards hold {}",
                    state.decks_generated,
                    existing.total_decks()
                ),
            ));
        }
        Ok(existing)
    }

    /// Tops up the last shard, then starts new ones of `shard_capacity` decks.
    fn write_shards(
        &self,
        seed: u64,
        existing: Option<&ShardSet>,
        mut fresh: DeckBatch,
    ) -> Result<Vec<PathBuf>, PenneyError> {
        let mut written = Vec::new();
        let mut next_index = 1u32;

        if let Some(last) = existing.and_then(ShardSet::last) {
            next_index = last.index + 1;
            let room = self.shard_capacity.saturating_sub(last.header.deck_count);
            if room > 0 {
                let rest = fresh.split_off(room);
                let mut combined = read_shard(seed, &last.path, fresh.half_deck_size())?;
                combined.extend_from(&fresh);
                write_shard(&last.path, &combined)?;
                tracing::debug!(seed, shard = last.index, decks = combined.len(), "topped up shard");
                written.push(last.path.clone());
                fresh = rest;
            }
        }

        while !fresh.is_empty() {
            let rest = fresh.split_off(self.shard_capacity);
            let path = self.storage.shard_path(seed, next_index);
            write_shard(&path, &fresh)?;
            tracing::debug!(seed, shard = next_index, decks = fresh.len(), "wrote shard");
            written.push(path);
            next_index += 1;
            fresh = rest;
        }

        Ok(written)
    }
}
