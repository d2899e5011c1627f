//! On-disk layout for one storage root.
//!
//! ```text
//! <root>/decks/decks_<seed>_<index>.bin   deck shards, index from 1
//! <root>/state/state_<seed>.json          generator snapshot
//! <root>/results/<rule>_<seed>.json       pair statistics per rule
//! <root>/progress/processed_<seed>.txt    decks folded into statistics
//! <root>/locks/seed_<seed>.lock           held while a run mutates the seed
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PenneyError;
use crate::scoring::Rule;

const SHARD_PREFIX: &str = "decks_";
const SHARD_EXT: &str = "bin";
const PROGRESS_PREFIX: &str = "processed_";

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn decks_dir(&self) -> PathBuf {
        self.root.join("decks")
    }

    pub fn shard_path(&self, seed: u64, index: u32) -> PathBuf {
        self.decks_dir()
            .join(format!("{SHARD_PREFIX}{seed}_{index:04}.{SHARD_EXT}"))
    }

    pub fn state_path(&self, seed: u64) -> PathBuf {
        self.root.join("state").join(format!("state_{seed}.json"))
    }

    pub fn stats_path(&self, seed: u64, rule: Rule) -> PathBuf {
        self.root
            .join("results")
            .join(format!("{}_{seed}.json", rule.as_str()))
    }

    pub fn progress_dir(&self) -> PathBuf {
        self.root.join("progress")
    }

    pub fn progress_path(&self, seed: u64) -> PathBuf {
        self.progress_dir()
            .join(format!("{PROGRESS_PREFIX}{seed}.txt"))
    }

    fn lock_path(&self, seed: u64) -> PathBuf {
        self.root.join("locks").join(format!("seed_{seed}.lock"))
    }

    /// Shards for `seed` sorted by index.
    pub fn list_shards(&self, seed: u64) -> Result<Vec<(u32, PathBuf)>, PenneyError> {
        let dir = self.decks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{SHARD_PREFIX}{seed}_");
        let entries =
            fs::read_dir(&dir).map_err(|e| PenneyError::io("listing deck shards in", &dir, e))?;

        let mut shards = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PenneyError::io("listing deck shards in", &dir, e))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(index) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&format!(".{SHARD_EXT}")))
                .and_then(|digits| digits.parse::<u32>().ok())
            else {
                continue;
            };
            shards.push((index, path));
        }
        shards.sort_by_key(|(index, _)| *index);
        Ok(shards)
    }

    /// Seeds that have a progress record, ascending.
    pub fn seeds_with_progress(&self) -> Result<Vec<u64>, PenneyError> {
        let dir = self.progress_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&dir).map_err(|e| PenneyError::io("listing progress records in", &dir, e))?;
        let mut seeds = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PenneyError::io("listing progress records in", &dir, e))?;
            let name = entry.file_name();
            let Some(seed) = name
                .to_str()
                .and_then(|n| n.strip_prefix(PROGRESS_PREFIX))
                .and_then(|n| n.strip_suffix(".txt"))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            seeds.push(seed);
        }
        seeds.sort_unstable();
        Ok(seeds)
    }

    /// Removes every artifact persisted for `seed`.
    pub fn clear_seed(&self, seed: u64) -> Result<(), PenneyError> {
        let mut targets: Vec<PathBuf> = self
            .list_shards(seed)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        targets.push(self.state_path(seed));
        targets.push(self.progress_path(seed));
        for rule in Rule::ALL {
            targets.push(self.stats_path(seed, rule));
        }
        for path in targets {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(PenneyError::io("removing", path, err)),
            }
        }
        Ok(())
    }

    /// Takes the exclusive per-seed lock, failing with `Busy` if another run holds it.
    pub fn lock_seed(&self, seed: u64) -> Result<SeedLock, PenneyError> {
        let path = self.lock_path(seed);
        ensure_parent(&path)?;
        let file = match OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PenneyError::Busy { seed, path });
            }
            Err(err) => return Err(PenneyError::io("creating lock", path, err)),
        };
        Ok(SeedLock { path, _file: file })
    }
}

/// Held for the duration of a run; the lock file is removed on drop.
#[derive(Debug)]
pub struct SeedLock {
    path: PathBuf,
    _file: File,
}

impl Drop for SeedLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), PenneyError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PenneyError::io("creating directory", dir, e))?;
    }
    Ok(())
}

/// Writes `bytes` to a sibling temp file, syncs it, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PenneyError> {
    let staged = stage(path, bytes)?;
    publish(&staged, path).inspect_err(|_| discard(&staged))
}

/// Writes a file to its temp sibling without publishing it; see [`publish`].
pub(crate) fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf, PenneyError> {
    ensure_parent(path)?;
    let tmp_path = temp_path(path);
    let mut file =
        File::create(&tmp_path).map_err(|e| PenneyError::io("creating temp file", &tmp_path, e))?;
    if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
        discard(&tmp_path);
        return Err(PenneyError::io("writing temp file", &tmp_path, e));
    }
    Ok(tmp_path)
}

pub(crate) fn publish(staged: &Path, path: &Path) -> Result<(), PenneyError> {
    fs::rename(staged, path).map_err(|e| PenneyError::io("renaming temp file onto", path, e))
}

pub(crate) fn discard(staged: &Path) {
    let _ = fs::remove_file(staged);
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reads a file, mapping a missing file to `Ok(None)`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, PenneyError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PenneyError::io("reading", path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn shard_listing_sorts_by_index_and_ignores_other_seeds() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        for (seed, index) in [(5, 2), (5, 10), (5, 1), (55, 1)] {
            write_atomic(&storage.shard_path(seed, index), b"x").unwrap();
        }
        let shards = storage.list_shards(5).unwrap();
        let indices: Vec<u32> = shards.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 10]);
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn second_lock_is_rejected_until_first_drops() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let lock = storage.lock_seed(9).unwrap();
        let err = storage.lock_seed(9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(storage.lock_seed(10).is_ok());
        drop(lock);
        assert!(storage.lock_seed(9).is_ok());
    }

    #[test]
    fn clear_seed_removes_only_that_seed() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        write_atomic(&storage.shard_path(1, 1), b"a").unwrap();
        write_atomic(&storage.state_path(1), b"{}").unwrap();
        write_atomic(&storage.progress_path(1), b"3").unwrap();
        write_atomic(&storage.shard_path(2, 1), b"b").unwrap();
        storage.clear_seed(1).unwrap();
        assert!(storage.list_shards(1).unwrap().is_empty());
        assert!(!storage.state_path(1).exists());
        assert!(!storage.progress_path(1).exists());
        assert_eq!(storage.list_shards(2).unwrap().len(), 1);
    }

    #[test]
    fn seeds_with_progress_are_sorted() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        for seed in [42, 7, 1000] {
            write_atomic(&storage.progress_path(seed), b"0").unwrap();
        }
        assert_eq!(storage.seeds_with_progress().unwrap(), vec![7, 42, 1000]);
    }
}
