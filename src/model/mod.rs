//! Model layers and the two-stage pipeline
//!
//! Leaves first: embedding front ends, convolution stages, the folding
//! k-max-pooling core, batch normalization, projection-head layers, loss and
//! metrics, and the `TextDcnn` composer that wires them together.

pub mod conv;
pub mod dcnn;
pub mod embedding;
pub mod highway;
pub mod loss;
pub mod norm;
pub mod pooling;

pub use conv::{ChannelConv1d, DilatedConv2d};
pub use dcnn::{ForwardOutput, TextDcnn};
pub use embedding::{Embedding, RegionEmbedding};
pub use highway::{dropout, Dense, Highway};
pub use loss::{accuracy, argmax_rows, correct_count, l2_loss, softmax_cross_entropy, softmax_rows};
pub use norm::BatchNorm;
pub use pooling::{chunk_max_pool, folding_k_max_pool, k_max_pool};
