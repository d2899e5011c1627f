use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::error::PenneyError;
use crate::storage::{Storage, read_optional, write_atomic};

/// Snapshot of the deck generator's stream position.
///
/// `key`, `stream` and `word_pos` pin the ChaCha20 keystream exactly, so a
/// restored generator continues where the saved one stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorState {
    pub seed: u64,
    pub key: [u8; 32],
    pub stream: u64,
    #[serde(with = "decimal")]
    pub word_pos: u128,
    pub half_deck_size: usize,
    pub decks_generated: u64,
}

impl GeneratorState {
    pub fn capture(seed: u64, rng: &ChaCha20Rng, half_deck_size: usize, decks_generated: u64) -> Self {
        Self {
            seed,
            key: rng.get_seed(),
            stream: rng.get_stream(),
            word_pos: rng.get_word_pos(),
            half_deck_size,
            decks_generated,
        }
    }

    pub fn restore(&self) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::from_seed(self.key);
        rng.set_stream(self.stream);
        rng.set_word_pos(self.word_pos);
        rng
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// `u128` as a decimal string, so the JSON stays readable by any parser.
mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fresh generator for `seed`, before any deck is drawn.
pub fn seeded_rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

/// Persists one [`GeneratorState`] per seed.
#[derive(Debug, Clone)]
pub struct RngStateStore {
    storage: Storage,
}

impl RngStateStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn save(&self, state: &GeneratorState) -> Result<(), PenneyError> {
        let path = self.storage.state_path(state.seed);
        let json = state
            .to_json()
            .map_err(|e| PenneyError::corrupt(state.seed, "generator state", &path, e.to_string()))?;
        write_atomic(&path, json.as_bytes())
    }

    pub fn load(&self, seed: u64) -> Result<GeneratorState, PenneyError> {
        let path = self.storage.state_path(seed);
        let Some(bytes) = read_optional(&path)? else {
            return Err(PenneyError::NotFound {
                seed,
                what: "generator state",
            });
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| PenneyError::corrupt(seed, "generator state", &path, e.to_string()))?;
        let state = GeneratorState::from_json(&text)
            .map_err(|e| PenneyError::corrupt(seed, "generator state", &path, e.to_string()))?;
        if state.seed != seed {
            return Err(PenneyError::corrupt(
                seed,
                "generator state",
                &path,
                format!("snapshot belongs to seed {}", state.seed),
            ));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rand::RngCore;
    use tempfile::tempdir;

    #[test]
    fn restored_rng_continues_the_stream() {
        let mut continuous = seeded_rng(42);
        let mut interrupted = seeded_rng(42);
        for _ in 0..37 {
            continuous.next_u32();
            interrupted.next_u32();
        }
        let snapshot = GeneratorState::capture(42, &interrupted, 26, 0);
        let mut resumed = snapshot.restore();
        for _ in 0..100 {
            assert_eq!(continuous.next_u32(), resumed.next_u32());
        }
    }

    #[test]
    fn store_round_trips_snapshot() {
        let dir = tempdir().unwrap();
        let store = RngStateStore::new(Storage::new(dir.path()));
        let mut rng = seeded_rng(7);
        rng.next_u64();
        let state = GeneratorState::capture(7, &rng, 3, 12);
        store.save(&state).unwrap();
        assert_eq!(store.load(7).unwrap(), state);
    }

    #[test]
    fn missing_state_is_not_found() {
        let dir = tempdir().unwrap();
        let store = RngStateStore::new(Storage::new(dir.path()));
        assert_eq!(store.load(1).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unparsable_state_is_corrupt() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        write_atomic(&storage.state_path(3), b"{ not json").unwrap();
        let store = RngStateStore::new(storage);
        assert_eq!(store.load(3).unwrap_err().kind(), ErrorKind::CorruptState);
    }
}
