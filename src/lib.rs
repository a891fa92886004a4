//! plegar — folding k-max-pooling DCNN for text classification
//!
//! Builds the forward computation graph of a deep convolutional text
//! classifier: embedding lookup (or region embedding), two stages of
//! per-channel wide convolution (or atrous convolution) with batch
//! normalization and folding k-max pooling, then a dense + highway +
//! dropout projection head and a softmax cross-entropy loss with L2
//! regularization on the output layer.
//!
//! The Feature Tensor threading through the pipeline is an
//! `ndarray::Array4<f32>` with axes (batch, sequence_position,
//! embedding_channel, filter_channel). Folding sums adjacent
//! embedding-channel pairs; k-max pooling keeps the k strongest activations
//! per channel along the sequence axis, in descending value order.
//!
//! ## Example
//!
//! ```
//! use ndarray::Array2;
//! use plegar::{DcnnConfig, TextDcnn};
//!
//! let config = DcnnConfig::tiny();
//! let tokens = Array2::from_shape_fn((4, config.sequence_length), |(b, t)| {
//!     ((b * 7 + t) % config.vocab_size) as u32
//! });
//! let labels = Array2::from_shape_fn((4, config.num_classes), |(b, c)| {
//!     if b % 2 == c { 1.0 } else { 0.0 }
//! });
//!
//! let mut model = TextDcnn::new(config).unwrap();
//! let out = model.forward(&tokens, &labels, 0.5, true).unwrap();
//! assert_eq!(out.logits.nrows(), 4);
//! assert!(out.loss.is_finite());
//! ```
//!
//! Gradient computation, checkpointing, data loading, and training-loop
//! orchestration are out of scope; this crate owns the forward graph and
//! its trainable parameters only.

pub mod config;
pub mod error;
pub mod model;

pub use config::{ConvKind, DcnnConfig, EmbeddingKind};
pub use error::{ModelError, Result};
pub use model::{ForwardOutput, TextDcnn};
