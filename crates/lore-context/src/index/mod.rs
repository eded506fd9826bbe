//! Flat vector index and its blob persistence.

mod flat;
mod store;

pub use flat::{FlatL2Index, Neighbor};
pub use store::{CollectionIndex, VectorIndexStore};
