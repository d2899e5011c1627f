pub mod aggregate;
pub mod error;
pub mod generator;
pub mod model;
pub mod scoring;
pub mod storage;

pub use aggregate::ledger::ProgressLedger;
pub use aggregate::stats::{PairStatistics, StatsTable, Tally};
pub use aggregate::{AggregateReport, Aggregator};
pub use error::{ErrorKind, PenneyError};
pub use generator::state::{GeneratorState, RngStateStore};
pub use generator::{DeckGenerator, GenerationOutcome, GenerationRequest, StartMode};
pub use model::deck::DeckBatch;
pub use model::sequence::{SEQUENCE_LEN, Sequence, SequencePair};
pub use scoring::{Outcome, Rule};
pub use storage::Storage;
