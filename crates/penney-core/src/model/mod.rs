pub mod deck;
pub mod sequence;
