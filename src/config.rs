//! Model configuration
//!
//! All pipeline choices are fixed here at construction time: which
//! convolution path runs (channel-wise or dilated) and which embedding front
//! end feeds it (plain table lookup or region embedding). The forward pass
//! never re-decides these.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Convolution path used by both pipeline stages.
///
/// The two paths are mutually exclusive; a model is built with exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvKind {
    /// One independent 1-D convolution per embedding channel.
    Channelwise,
    /// Atrous 2-D convolution over the (sequence, embedding) plane.
    Dilated {
        /// Dilation rate applied to both spatial axes.
        rate: usize,
    },
}

/// Embedding front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingKind {
    /// Plain row-indexing lookup into the embedding table.
    Table,
    /// Region embedding: context units multiplied into neighbor-window
    /// embeddings, max-reduced over the window. Trims `region_size / 2`
    /// positions from each end of the sequence.
    Region { region_size: usize },
}

/// Configuration for the folding k-max-pooling DCNN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcnnConfig {
    /// Fixed input sequence length (tokens per example)
    pub sequence_length: usize,
    /// Number of output classes
    pub num_classes: usize,
    /// Vocabulary size
    pub vocab_size: usize,
    /// Embedding dimension; folding is applied twice, so this must be
    /// divisible by 4
    pub embedding_size: usize,
    /// Filter widths for the two convolution stages
    pub filter_sizes: [usize; 2],
    /// Output filter counts for the two convolution stages
    pub num_filters: [usize; 2],
    /// Pooling width after the second stage (final sequence length)
    pub top_k: usize,
    /// Pooling width after the first stage
    pub k1: usize,
    /// L2 regularization strength applied to the output layer
    pub l2_reg_lambda: f32,
    /// Width of the fully-connected hidden layer
    pub fc_hidden_size: usize,
    /// Which convolution path to build
    pub conv_kind: ConvKind,
    /// Which embedding front end to build
    pub embedding_kind: EmbeddingKind,
}

impl DcnnConfig {
    /// Defaults matching the reference model: filter widths [7, 5], filter
    /// counts [8, 14], k1 = 12, top_k = 6, 2048-wide hidden layer.
    pub fn default_text() -> Self {
        Self {
            sequence_length: 56,
            num_classes: 2,
            vocab_size: 10_000,
            embedding_size: 128,
            filter_sizes: [7, 5],
            num_filters: [8, 14],
            top_k: 6,
            k1: 12,
            l2_reg_lambda: 0.0,
            fc_hidden_size: 2048,
            conv_kind: ConvKind::Channelwise,
            embedding_kind: EmbeddingKind::Table,
        }
    }

    /// Tiny configuration for testing
    pub fn tiny() -> Self {
        Self {
            sequence_length: 10,
            num_classes: 2,
            vocab_size: 50,
            embedding_size: 8,
            filter_sizes: [3, 3],
            num_filters: [2, 2],
            top_k: 3,
            k1: 6,
            l2_reg_lambda: 0.0,
            fc_hidden_size: 16,
            conv_kind: ConvKind::Channelwise,
            embedding_kind: EmbeddingKind::Table,
        }
    }

    /// Sequence length actually seen by the first convolution stage.
    ///
    /// Region embedding trims `region_size / 2` positions from each end.
    pub fn effective_sequence_length(&self) -> usize {
        match self.embedding_kind {
            EmbeddingKind::Table => self.sequence_length,
            EmbeddingKind::Region { region_size } => {
                self.sequence_length.saturating_sub(2 * (region_size / 2))
            }
        }
    }

    /// Feature count after the final pooling stage is flattened:
    /// top_k * (embedding_size / 4) * num_filters[1].
    pub fn flattened_features(&self) -> usize {
        self.top_k * (self.embedding_size / 4) * self.num_filters[1]
    }

    /// Check every construction-time precondition.
    pub fn validate(&self) -> Result<()> {
        if self.sequence_length == 0 {
            return Err(ModelError::InvalidConfig(
                "sequence_length must be positive".into(),
            ));
        }
        if self.num_classes < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            )));
        }
        if self.vocab_size == 0 {
            return Err(ModelError::InvalidConfig(
                "vocab_size must be positive".into(),
            ));
        }
        if self.embedding_size == 0 || self.embedding_size % 4 != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "embedding_size must be a positive multiple of 4 (folding halves it twice), got {}",
                self.embedding_size
            )));
        }
        if self.filter_sizes.iter().any(|&w| w == 0) {
            return Err(ModelError::InvalidConfig(
                "filter widths must be positive".into(),
            ));
        }
        if self.num_filters.iter().any(|&n| n == 0) {
            return Err(ModelError::InvalidConfig(
                "filter counts must be positive".into(),
            ));
        }
        if self.fc_hidden_size == 0 {
            return Err(ModelError::InvalidConfig(
                "fc_hidden_size must be positive".into(),
            ));
        }
        if self.l2_reg_lambda < 0.0 || !self.l2_reg_lambda.is_finite() {
            return Err(ModelError::InvalidConfig(format!(
                "l2_reg_lambda must be finite and non-negative, got {}",
                self.l2_reg_lambda
            )));
        }
        if let EmbeddingKind::Region { region_size } = self.embedding_kind {
            if region_size < 3 || region_size % 2 == 0 {
                return Err(ModelError::InvalidConfig(format!(
                    "region_size must be odd and at least 3, got {region_size}"
                )));
            }
            if self.sequence_length <= 2 * (region_size / 2) {
                return Err(ModelError::InvalidConfig(format!(
                    "sequence_length {} too short for region_size {region_size}",
                    self.sequence_length
                )));
            }
        }
        if let ConvKind::Dilated { rate } = self.conv_kind {
            if rate == 0 {
                return Err(ModelError::InvalidConfig(
                    "dilation rate must be at least 1".into(),
                ));
            }
        }
        let effective = self.effective_sequence_length();
        if self.k1 == 0 || self.k1 > effective {
            return Err(ModelError::InvalidConfig(format!(
                "k1 {} must be in 1..={} (effective sequence length)",
                self.k1, effective
            )));
        }
        // The second pooling stage sees a sequence of length k1.
        if self.top_k == 0 || self.top_k > self.k1 {
            return Err(ModelError::InvalidConfig(format!(
                "top_k {} must be in 1..={} (k1)",
                self.top_k, self.k1
            )));
        }
        Ok(())
    }
}
