use std::path::PathBuf;

use crate::error::PenneyError;
use crate::storage::{Storage, read_optional, write_atomic};

/// Per-seed count of decks already folded into the pair statistics.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    storage: Storage,
}

impl ProgressLedger {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Recorded count, or 0 when the seed has never been aggregated.
    pub fn get(&self, seed: u64) -> Result<u64, PenneyError> {
        match self.load(seed) {
            Err(PenneyError::NotFound { .. }) => Ok(0),
            other => other,
        }
    }

    /// Recorded count, `NotFound` when absent.
    pub fn load(&self, seed: u64) -> Result<u64, PenneyError> {
        let path = self.storage.progress_path(seed);
        let Some(bytes) = read_optional(&path)? else {
            return Err(PenneyError::NotFound {
                seed,
                what: "progress record",
            });
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                PenneyError::corrupt(seed, "progress record", &path, "not a non-negative integer")
            })
    }

    pub fn set(&self, seed: u64, count: u64) -> Result<(), PenneyError> {
        let (path, bytes) = self.record(seed, count);
        write_atomic(&path, &bytes)
    }

    /// Target path and contents of the progress record for `count`.
    pub(crate) fn record(&self, seed: u64, count: u64) -> (PathBuf, Vec<u8>) {
        (self.storage.progress_path(seed), count.to_string().into_bytes())
    }

    /// `(seed, decks processed)` for every seed with a progress record.
    pub fn entries(&self) -> Result<Vec<(u64, u64)>, PenneyError> {
        self.storage
            .seeds_with_progress()?
            .into_iter()
            .map(|seed| self.load(seed).map(|count| (seed, count)))
            .collect()
    }
}
