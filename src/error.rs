//! Model error types

use thiserror::Error;

/// Errors raised by graph construction and forward-pass precondition checks.
///
/// Every variant is fatal: these are programmer errors caught by validation,
/// not conditions to retry (shape mismatches, impossible pooling widths,
/// out-of-range token ids).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("folding requires an even channel count, got {channels}")]
    OddChannelCount { channels: usize },

    #[error("top-k of {k} exceeds sequence length {seq_len}")]
    TopKExceedsLength { k: usize, seq_len: usize },

    #[error("pooling width must be positive")]
    ZeroPoolingWidth,

    #[error("token id {token} out of range for vocabulary of size {vocab_size}")]
    TokenOutOfRange { token: u32, vocab_size: usize },

    #[error("filter count mismatch: input carries {input} filters, filter bank expects {expected}")]
    FilterCountMismatch { input: usize, expected: usize },

    #[error("keep probability {keep_prob} outside (0, 1]")]
    InvalidKeepProbability { keep_prob: f32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_display() {
        let err = ModelError::OddChannelCount { channels: 7 };
        assert!(format!("{err}").contains("even channel count"));
        assert!(format!("{err}").contains('7'));

        let err = ModelError::TopKExceedsLength { k: 20, seq_len: 10 };
        assert!(format!("{err}").contains("top-k of 20"));
        assert!(format!("{err}").contains("10"));

        let err = ModelError::ZeroPoolingWidth;
        assert!(format!("{err}").contains("must be positive"));

        let err = ModelError::TokenOutOfRange {
            token: 99,
            vocab_size: 50,
        };
        assert!(format!("{err}").contains("token id 99"));

        let err = ModelError::FilterCountMismatch {
            input: 3,
            expected: 2,
        };
        assert!(format!("{err}").contains("filter count mismatch"));

        let err = ModelError::InvalidKeepProbability { keep_prob: 0.0 };
        assert!(format!("{err}").contains("keep probability"));

        let err = ModelError::InvalidConfig("embedding_size must be positive".into());
        assert!(format!("{err}").contains("invalid configuration"));
    }
}
