//! Binary deck shard format.
//!
//! Layout: 16-byte little-endian header (`magic`, `version`,
//! `half_deck_size`, `deck_count`, all `u32`) followed by one byte per
//! card, decks stored row after row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::PenneyError;
use crate::model::deck::DeckBatch;
use crate::storage::{Storage, write_atomic};

/// Magic number: "PNDK" in little-endian.
pub const SHARD_MAGIC: u32 = u32::from_le_bytes(*b"PNDK");
pub const SHARD_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// Default number of decks per shard.
pub const DEFAULT_SHARD_CAPACITY: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardHeader {
    pub half_deck_size: usize,
    pub deck_count: usize,
}

impl ShardHeader {
    fn encode(&self) -> Result<[u8; HEADER_LEN], PenneyError> {
        let half = u32::try_from(self.half_deck_size)
            .map_err(|_| PenneyError::invalid("half_deck_size does not fit a shard header"))?;
        let count = u32::try_from(self.deck_count)
            .map_err(|_| PenneyError::invalid("shard deck count does not fit a shard header"))?;
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&SHARD_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&SHARD_VERSION.to_le_bytes());
        bytes[8..12].copy_from_slice(&half.to_le_bytes());
        bytes[12..16].copy_from_slice(&count.to_le_bytes());
        Ok(bytes)
    }

    fn decode(seed: u64, path: &Path, bytes: &[u8]) -> Result<Self, PenneyError> {
        if bytes.len() < HEADER_LEN {
            return Err(PenneyError::corrupt(seed, "deck shard", path, "truncated header"));
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        if word(0) != SHARD_MAGIC {
            return Err(PenneyError::corrupt(seed, "deck shard", path, "bad magic"));
        }
        if word(4) != SHARD_VERSION {
            return Err(PenneyError::corrupt(
                seed,
                "deck shard",
                path,
                format!("unsupported version {}", word(4)),
            ));
        }
        Ok(Self {
            half_deck_size: word(8) as usize,
            deck_count: word(12) as usize,
        })
    }
}

pub fn write_shard(path: &Path, decks: &DeckBatch) -> Result<(), PenneyError> {
    let header = ShardHeader {
        half_deck_size: decks.half_deck_size(),
        deck_count: decks.len(),
    }
    .encode()?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + decks.as_bytes().len());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(decks.as_bytes());
    write_atomic(path, &bytes)
}

/// Reads only the header, for counting decks without loading them.
pub fn read_header(seed: u64, path: &Path) -> Result<ShardHeader, PenneyError> {
    let mut file = File::open(path).map_err(|e| PenneyError::io("opening deck shard", path, e))?;
    let mut bytes = [0u8; HEADER_LEN];
    file.read_exact(&mut bytes).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            PenneyError::corrupt(seed, "deck shard", path, "truncated header")
        } else {
            PenneyError::io("reading deck shard", path, e)
        }
    })?;
    ShardHeader::decode(seed, path, &bytes)
}

/// Loads and validates a full shard.
pub fn read_shard(seed: u64, path: &Path, half_deck_size: usize) -> Result<DeckBatch, PenneyError> {
    let mut bytes =
        std::fs::read(path).map_err(|e| PenneyError::io("reading deck shard", path, e))?;
    let header = ShardHeader::decode(seed, path, &bytes)?;
    if header.half_deck_size != half_deck_size {
        return Err(PenneyError::corrupt(
            seed,
            "deck shard",
            path,
            format!(
                "row length {} does not match half-deck size {half_deck_size}",
                header.half_deck_size * 2
            ),
        ));
    }
    let expected = header.deck_count * half_deck_size * 2;
    if bytes.len() - HEADER_LEN != expected {
        return Err(PenneyError::corrupt(
            seed,
            "deck shard",
            path,
            format!(
                "header promises {} decks ({expected} bytes) but payload has {} bytes",
                header.deck_count,
                bytes.len() - HEADER_LEN
            ),
        ));
    }
    let symbols = bytes.split_off(HEADER_LEN);
    let batch = DeckBatch::from_raw(half_deck_size, symbols);
    if let Some(row) = batch.first_unbalanced() {
        return Err(PenneyError::corrupt(
            seed,
            "deck shard",
            path,
            format!("deck {row} is not a balanced binary deck"),
        ));
    }
    Ok(batch)
}

/// Header summary of every shard for a seed, in index order.
#[derive(Debug, Clone)]
pub struct ShardSet {
    pub shards: Vec<ShardEntry>,
}

#[derive(Debug, Clone)]
pub struct ShardEntry {
    pub index: u32,
    pub path: std::path::PathBuf,
    pub header: ShardHeader,
}

impl ShardSet {
    pub fn scan(storage: &Storage, seed: u64) -> Result<Self, PenneyError> {
        let mut shards = Vec::new();
        for (index, path) in storage.list_shards(seed)? {
            let header = read_header(seed, &path)?;
            shards.push(ShardEntry {
                index,
                path,
                header,
            });
        }
        Ok(Self { shards })
    }

    pub fn total_decks(&self) -> u64 {
        self.shards.iter().map(|s| s.header.deck_count as u64).sum()
    }

    pub fn last(&self) -> Option<&ShardEntry> {
        self.shards.last()
    }

    /// Half-deck size shared by all shards; `CorruptState` if they disagree.
    pub fn half_deck_size(&self, seed: u64) -> Result<Option<usize>, PenneyError> {
        let mut found: Option<usize> = None;
        for shard in &self.shards {
            match found {
                None => found = Some(shard.header.half_deck_size),
                Some(half) if half != shard.header.half_deck_size => {
                    return Err(PenneyError::corrupt(
                        seed,
                        "deck shard",
                        &shard.path,
                        format!(
                            "half-deck size {} differs from earlier shards ({half})",
                            shard.header.half_deck_size
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(found)
    }

    /// Loads the decks at positions `[from, total)` across all shards,
    /// skipping shards that end before `from` without reading their bodies.
    pub fn load_suffix(&self, seed: u64, from: u64, half_deck_size: usize) -> Result<DeckBatch, PenneyError> {
        let mut suffix = DeckBatch::new(half_deck_size);
        let mut offset = 0u64;
        for shard in &self.shards {
            let count = shard.header.deck_count as u64;
            let end = offset + count;
            if end > from {
                let mut decks = read_shard(seed, &shard.path, half_deck_size)?;
                let skip = from.saturating_sub(offset) as usize;
                let tail = decks.split_off(skip);
                suffix.extend_from(&tail);
                tracing::debug!(seed, shard = shard.index, decks = tail.len(), "loaded shard suffix");
            }
            offset = end;
        }
        Ok(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::generator::state::seeded_rng;
    use tempfile::tempdir;

    fn batch(half: usize, n: usize, seed: u64) -> DeckBatch {
        let mut rng = seeded_rng(seed);
        let mut decks = DeckBatch::new(half);
        for _ in 0..n {
            decks.push_shuffled(&mut rng);
        }
        decks
    }

    #[test]
    fn shard_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.bin");
        let decks = batch(4, 9, 1);
        write_shard(&path, &decks).unwrap();
        assert_eq!(
            read_header(1, &path).unwrap(),
            ShardHeader {
                half_deck_size: 4,
                deck_count: 9
            }
        );
        assert_eq!(read_shard(1, &path, 4).unwrap(), decks);
    }

    #[test]
    fn mismatched_row_length_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.bin");
        write_shard(&path, &batch(4, 2, 1)).unwrap();
        let err = read_shard(1, &path, 26).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptState);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.bin");
        write_shard(&path, &batch(3, 4, 2)).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert_eq!(read_shard(2, &path, 3).unwrap_err().kind(), ErrorKind::CorruptState);
    }

    #[test]
    fn unbalanced_row_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.bin");
        write_shard(&path, &batch(2, 3, 5)).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 1 - bytes[last];
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(read_shard(5, &path, 2).unwrap_err().kind(), ErrorKind::CorruptState);
    }

    #[test]
    fn suffix_skips_leading_shards() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let decks = batch(3, 10, 8);
        let mut first = decks.clone();
        let second = first.split_off(6);
        write_shard(&storage.shard_path(8, 1), &first).unwrap();
        write_shard(&storage.shard_path(8, 2), &second).unwrap();

        let set = ShardSet::scan(&storage, 8).unwrap();
        assert_eq!(set.total_decks(), 10);
        assert_eq!(set.half_deck_size(8).unwrap(), Some(3));

        let mut expected = decks.clone();
        let expected_tail = expected.split_off(7);
        assert_eq!(set.load_suffix(8, 7, 3).unwrap(), expected_tail);
        assert!(set.load_suffix(8, 10, 3).unwrap().is_empty());
        assert_eq!(set.load_suffix(8, 0, 3).unwrap(), decks);
    }
}
