use std::path::PathBuf;

use thiserror::Error;

/// Broad category of a [`PenneyError`], for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    CorruptState,
    Busy,
    Io,
}

#[derive(Debug, Error)]
pub enum PenneyError {
    #[error("no persisted {what} for seed {seed}")]
    NotFound { seed: u64, what: &'static str },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("corrupt {what} for seed {seed} at {path:?}: {message}")]
    CorruptState {
        seed: u64,
        what: &'static str,
        path: PathBuf,
        message: String,
    },
    #[error("seed {seed} is already locked by another run ({path:?})")]
    Busy { seed: u64, path: PathBuf },
    #[error("{context} {path:?}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PenneyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PenneyError::NotFound { .. } => ErrorKind::NotFound,
            PenneyError::InvalidInput { .. } => ErrorKind::InvalidInput,
            PenneyError::CorruptState { .. } => ErrorKind::CorruptState,
            PenneyError::Busy { .. } => ErrorKind::Busy,
            PenneyError::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        PenneyError::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(
        seed: u64,
        what: &'static str,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        PenneyError::CorruptState {
            seed,
            what,
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PenneyError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = PenneyError::NotFound {
            seed: 7,
            what: "generator state",
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "no persisted generator state for seed 7");

        let err = PenneyError::corrupt(3, "deck shard", "decks/x.bin", "bad magic");
        assert_eq!(err.kind(), ErrorKind::CorruptState);
        assert!(err.to_string().contains("seed 3"));
    }
}
