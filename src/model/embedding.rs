//! Embedding front ends: table lookup and region embedding

use crate::error::{ModelError, Result};
use ndarray::{s, Array2, Array3};

/// Token embedding table.
///
/// Values are initialized uniformly in [-1, 1] (deterministic sin pattern so
/// two models built from the same config are bit-identical). The table is
/// read-only during a forward pass; only an external optimizer mutates it.
pub struct Embedding {
    /// Embedding weight (vocab_size x embedding_size)
    pub weight: Array2<f32>,
    vocab_size: usize,
    embedding_size: usize,
}

impl Embedding {
    /// Create a new embedding table with initialized weights
    pub fn new(vocab_size: usize, embedding_size: usize) -> Self {
        Self {
            weight: Array2::from_shape_fn((vocab_size, embedding_size), |(i, j)| {
                ((i * embedding_size + j) as f32 * 0.137).sin()
            }),
            vocab_size,
            embedding_size,
        }
    }

    /// Look up embeddings for a batch of token id sequences.
    ///
    /// Input is (batch, seq_len); output is (batch, seq_len, embedding_size).
    /// Ids outside [0, vocab_size) are rejected eagerly.
    pub fn forward(&self, tokens: &Array2<u32>) -> Result<Array3<f32>> {
        let (batch, seq_len) = tokens.dim();
        let mut out = Array3::zeros((batch, seq_len, self.embedding_size));
        for ((b, t), &token) in tokens.indexed_iter() {
            let idx = token as usize;
            if idx >= self.vocab_size {
                return Err(ModelError::TokenOutOfRange {
                    token,
                    vocab_size: self.vocab_size,
                });
            }
            out.slice_mut(s![b, t, ..]).assign(&self.weight.row(idx));
        }
        Ok(out)
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Get embedding dimension
    pub fn embedding_size(&self) -> usize {
        self.embedding_size
    }
}

/// Region embedding front end.
///
/// Each interior position gets the elementwise product of its neighbor
/// window's word embeddings with a learned per-token context unit, reduced
/// by max over the window. The output sequence is shorter than the input by
/// `region_size - 1` positions (`region_size / 2` trimmed from each end).
pub struct RegionEmbedding {
    /// Context units (vocab_size x region_size x embedding_size)
    pub context: Array3<f32>,
    region_size: usize,
}

impl RegionEmbedding {
    /// Create context units with initialized weights
    pub fn new(vocab_size: usize, region_size: usize, embedding_size: usize) -> Self {
        Self {
            context: Array3::from_shape_fn(
                (vocab_size, region_size, embedding_size),
                |(i, w, j)| (((i * region_size + w) * embedding_size + j) as f32 * 0.151).sin(),
            ),
            region_size,
        }
    }

    /// Region radius: positions trimmed from each end of the sequence.
    pub fn radius(&self) -> usize {
        self.region_size / 2
    }

    /// Compute region embeddings for a batch of token sequences.
    ///
    /// Input (batch, seq_len) with the shared word-embedding `table`;
    /// output (batch, seq_len - 2 * radius, embedding_size).
    pub fn forward(&self, tokens: &Array2<u32>, table: &Embedding) -> Result<Array3<f32>> {
        let (batch, seq_len) = tokens.dim();
        let radius = self.radius();
        if seq_len < self.region_size {
            return Err(ModelError::ShapeMismatch {
                context: "region embedding",
                expected: format!("sequence length >= region_size {}", self.region_size),
                actual: format!("sequence length {seq_len}"),
            });
        }
        let emb = table.embedding_size();
        let vocab = table.vocab_size();
        let out_len = seq_len - 2 * radius;
        let mut out = Array3::zeros((batch, out_len, emb));

        for b in 0..batch {
            for (o, center) in (radius..seq_len - radius).enumerate() {
                let center_tok = tokens[[b, center]] as usize;
                if center_tok >= vocab {
                    return Err(ModelError::TokenOutOfRange {
                        token: tokens[[b, center]],
                        vocab_size: vocab,
                    });
                }
                for j in 0..emb {
                    let mut best = f32::NEG_INFINITY;
                    for w in 0..self.region_size {
                        let neighbor = tokens[[b, center - radius + w]] as usize;
                        if neighbor >= vocab {
                            return Err(ModelError::TokenOutOfRange {
                                token: tokens[[b, center - radius + w]],
                                vocab_size: vocab,
                            });
                        }
                        let projected =
                            table.weight[[neighbor, j]] * self.context[[center_tok, w, j]];
                        if projected > best {
                            best = projected;
                        }
                    }
                    out[[b, o, j]] = best;
                }
            }
        }
        Ok(out)
    }
}
