//! Exact nearest-neighbour search over squared Euclidean distance.

use bincode::config::standard as bincode_config;
use bincode::{Decode, Encode, decode_from_slice, encode_to_vec};
use lore_core::{Error, Result};

/// A row matched by [`FlatL2Index::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion-order row id
    pub row: usize,
    /// Squared L2 distance to the query
    pub distance: f32,
}

/// Serialized form of an index.
#[derive(Debug, Encode, Decode)]
struct IndexBlob {
    version: u32,
    dimension: u64,
    count: u64,
    data: Vec<f32>,
}

/// Brute-force L2 index storing vectors row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Blob format version
    pub const VERSION: u32 = 1;

    /// Create an empty index for vectors of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Rebuild an index from row-major data.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `data` is not a whole number of rows
    pub fn from_parts(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(Error::InvalidInput(format!(
                "{} values do not form rows of dimension {dimension}",
                data.len()
            )));
        }
        Ok(Self { dimension, data })
    }

    /// Vector length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The vector stored at `row`.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Keep only the first `rows` vectors.
    pub fn truncate(&mut self, rows: usize) {
        self.data
            .truncate(rows.saturating_mul(self.dimension));
    }

    /// Append vectors; row ids continue from the current length.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if any vector has the wrong length.
    /// Nothing is appended in that case.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != self.dimension)
        {
            return Err(Error::InvalidInput(format!(
                "vector {position} has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// The `k` rows closest to `query`, nearest first; ties keep row order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `query` has the wrong length
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::InvalidInput(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| Neighbor {
                row,
                distance: squared_l2(query, vector),
            })
            .collect();
        neighbors.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then(left.row.cmp(&right.row))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Encode the index for storage.
    ///
    /// # Errors
    /// Returns [`Error::Encoding`] if encoding fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let blob = IndexBlob {
            version: Self::VERSION,
            dimension: self.dimension as u64,
            count: self.len() as u64,
            data: self.data.clone(),
        };
        encode_to_vec(&blob, bincode_config())
            .map_err(|error| Error::Encoding(format!("Failed to encode index: {error}")))
    }

    /// Decode an index written by [`Self::to_bytes`].
    ///
    /// # Errors
    /// Returns [`Error::Encoding`] for undecodable, mismatched or unsupported blobs
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (blob, _): (IndexBlob, usize) = decode_from_slice(bytes, bincode_config())
            .map_err(|error| Error::Encoding(format!("Failed to decode index: {error}")))?;

        if blob.version != Self::VERSION {
            return Err(Error::Encoding(format!(
                "Unsupported index version {}",
                blob.version
            )));
        }
        let dimension = usize::try_from(blob.dimension)
            .map_err(|_| Error::Encoding("Index dimension out of range".to_owned()))?;
        let expected = blob.dimension.checked_mul(blob.count);
        if dimension == 0 || expected != Some(blob.data.len() as u64) {
            return Err(Error::Encoding(format!(
                "Index header says {} x {} but holds {} values",
                blob.count,
                blob.dimension,
                blob.data.len()
            )));
        }

        Ok(Self {
            dimension,
            data: blob.data,
        })
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(lhs, rhs)| (lhs - rhs) * (lhs - rhs))
        .sum()
}
